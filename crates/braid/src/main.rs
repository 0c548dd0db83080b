//! Braid CLI binary.

use braid::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Exit code for user errors (validation, not-found).
const EXIT_USER_ERROR: i32 = 1;

/// Exit code for internal failures.
const EXIT_INTERNAL_ERROR: i32 = 2;

/// CLI commands are sequential and IO-bound; the current-thread runtime
/// keeps startup cheap.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("braid=warn,braid_jsonl=warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    if let Err(e) = cli.execute().await {
        eprintln!("error: {e:#}");
        let code = match e.downcast_ref::<braid::Error>() {
            Some(err) if err.is_user_error() => EXIT_USER_ERROR,
            _ => EXIT_INTERNAL_ERROR,
        };
        std::process::exit(code);
    }
}
