//! Content-addressed id generation.
//!
//! Ids are derived from an issue's defining fields, so two processes
//! creating distinct issues on different branches get different ids with no
//! coordination, while re-submitting identical content yields the same id.
//! The hash starts at 4 hex characters and widens to 5, then 6, when a
//! prefix collides with an id that carries *different* content.
//!
//! Hierarchical children of an epic get dotted suffixes instead:
//! `bd-a3f8.1`, `bd-a3f8.1.2`, at most three levels deep.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{content_hash, IssueType, MAX_HIERARCHY_DEPTH};
use crate::error::GraphError;

/// Narrowest hash width tried first.
const MIN_ID_WIDTH: usize = 4;

/// Widest hash width before giving up.
const MAX_ID_WIDTH: usize = 6;

/// Content-addressed id generator with collision widening.
///
/// The generator tracks every id in the store together with the content
/// hash it was minted for; the store inner state owns one instance and
/// re-registers ids on load.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    /// id -> content hash of the issue holding it.
    registered: HashMap<String, String>,
}

impl IdGenerator {
    /// Create a generator for the given id prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            registered: HashMap::new(),
        }
    }

    /// Register an existing id and the content hash it carries.
    pub fn register(&mut self, id: impl Into<String>, content_hash: impl Into<String>) {
        self.registered.insert(id.into(), content_hash.into());
    }

    /// Forget an id (issue removed from the store).
    pub fn unregister(&mut self, id: &str) {
        self.registered.remove(id);
    }

    /// Generate an id for the given defining content.
    ///
    /// Identical content always produces the identical id. A collision with
    /// an id minted for different content widens the hash by one character,
    /// up to [`MAX_ID_WIDTH`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CollisionExhausted`] when every width collides
    /// with foreign content.
    pub fn generate(
        &mut self,
        title: &str,
        description: &str,
        issue_type: IssueType,
    ) -> Result<String, GraphError> {
        // The content hash doubles as the id digest: the id is its prefix.
        let full_hash = content_hash(title, description, issue_type);

        for width in MIN_ID_WIDTH..=MAX_ID_WIDTH {
            let candidate = format!("{}-{}", self.prefix, &full_hash[..width]);
            match self.registered.get(&candidate) {
                // Same content already holds this id: idempotent re-submit.
                Some(existing) if *existing == full_hash => return Ok(candidate),
                Some(_) => {
                    debug!(
                        candidate,
                        width, "id collision with different content, widening"
                    );
                }
                None => {
                    self.registered.insert(candidate.clone(), full_hash);
                    return Ok(candidate);
                }
            }
        }

        Err(GraphError::CollisionExhausted {
            max_width: MAX_ID_WIDTH,
        })
    }

    /// Generate a hierarchical child id under `parent`.
    ///
    /// The suffix is the smallest positive integer not used by any existing
    /// direct child of the parent.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::HierarchyDepthExceeded`] when the parent
    /// already sits at the maximum nesting depth.
    pub fn generate_child(&mut self, parent: &str) -> Result<String, GraphError> {
        if crate::domain::IssueId::new(parent).depth() >= MAX_HIERARCHY_DEPTH {
            return Err(GraphError::HierarchyDepthExceeded(parent.to_string()));
        }

        let head = format!("{parent}.");
        let mut used: Vec<u32> = self
            .registered
            .keys()
            .filter_map(|id| id.strip_prefix(&head))
            .filter(|rest| !rest.contains('.'))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .collect();
        used.sort_unstable();

        let mut next = 1u32;
        for n in used {
            if n == next {
                next += 1;
            } else if n > next {
                break;
            }
        }

        let child = format!("{head}{next}");
        // Children are not content-addressed; register under an empty hash
        // so the slot is reserved and numbering moves on.
        self.registered.insert(child.clone(), String::new());
        Ok(child)
    }
}

/// Validate id format: `{prefix}-{4..6 hex}` plus optional numeric dotted
/// suffixes.
#[must_use]
pub fn validate_id(id: &str, prefix: &str) -> bool {
    let Some(after) = id.strip_prefix(prefix).and_then(|s| s.strip_prefix('-')) else {
        return false;
    };

    let mut parts = after.split('.');
    let Some(hash) = parts.next() else {
        return false;
    };
    if hash.len() < MIN_ID_WIDTH || hash.len() > MAX_ID_WIDTH {
        return false;
    }
    if !hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
        return false;
    }

    let mut levels = 0;
    for part in parts {
        levels += 1;
        if levels > MAX_HIERARCHY_DEPTH || part.parse::<u32>().is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> IdGenerator {
        IdGenerator::new("bd")
    }

    #[test]
    fn identical_content_is_idempotent() {
        let mut g = generator();
        let a = g.generate("Set up DB", "", IssueType::Task).unwrap();
        let b = g.generate("Set up DB", "", IssueType::Task).unwrap();
        assert_eq!(a, b);
        assert!(validate_id(&a, "bd"));
    }

    #[test]
    fn distinct_content_gets_distinct_ids() {
        let mut g = generator();
        let a = g.generate("Set up DB", "", IssueType::Task).unwrap();
        let b = g.generate("Set up DB!", "", IssueType::Task).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_collision_widens_the_hash() {
        let mut g = generator();
        let a = g.generate("First", "", IssueType::Task).unwrap();
        // Steal the 4-char id for different content to force widening.
        let digest_prefix = a.strip_prefix("bd-").unwrap().to_string();
        let mut g2 = generator();
        g2.register(format!("bd-{digest_prefix}"), "something-else");
        let b = g2.generate("First", "", IssueType::Task).unwrap();
        assert_eq!(b.len(), a.len() + 1);
        assert!(b.starts_with(&a));
    }

    #[test]
    fn exhausted_widening_fails() {
        let mut g = generator();
        let digest = content_hash("First", "", IssueType::Task);
        for width in MIN_ID_WIDTH..=MAX_ID_WIDTH {
            g.register(format!("bd-{}", &digest[..width]), "foreign");
        }
        let err = g.generate("First", "", IssueType::Task).unwrap_err();
        assert!(matches!(err, GraphError::CollisionExhausted { .. }));
    }

    #[test]
    fn child_ids_take_smallest_unused_sequence() {
        let mut g = generator();
        g.register("bd-a3f8", "h");
        g.register("bd-a3f8.1", "");
        g.register("bd-a3f8.3", "");
        assert_eq!(g.generate_child("bd-a3f8").unwrap(), "bd-a3f8.2");
        assert_eq!(g.generate_child("bd-a3f8").unwrap(), "bd-a3f8.4");
    }

    #[test]
    fn nesting_is_capped_at_three_levels() {
        let mut g = generator();
        assert_eq!(g.generate_child("bd-a3f8").unwrap(), "bd-a3f8.1");
        assert_eq!(g.generate_child("bd-a3f8.1").unwrap(), "bd-a3f8.1.1");
        assert_eq!(g.generate_child("bd-a3f8.1.1").unwrap(), "bd-a3f8.1.1.1");
        let err = g.generate_child("bd-a3f8.1.1.1").unwrap_err();
        assert!(matches!(err, GraphError::HierarchyDepthExceeded(_)));
    }

    #[test]
    fn id_format_validation() {
        assert!(validate_id("bd-a3f8", "bd"));
        assert!(validate_id("bd-a3f8e", "bd"));
        assert!(validate_id("bd-a3f8.1.2", "bd"));
        assert!(!validate_id("bd-a3f8.1.2.3.4", "bd"));
        assert!(!validate_id("bd-xyz9", "bd"));
        assert!(!validate_id("bd-a3f", "bd"));
        assert!(!validate_id("other-a3f8", "bd"));
        assert!(!validate_id("bd-a3f8.x", "bd"));
    }
}
