//! Result of comparing two typed values.

use crate::fieldpath::FieldSet;
use std::fmt;

/// Comparison holds the paths that differ between two values.
///
/// Containers that appear or disappear are listed together with their whole
/// subtree. Two maps or two lists at the same path are never "modified"
/// themselves; their differing descendants are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Present on the left-hand side only.
    pub removed: FieldSet,
    /// Present on both sides with different values.
    pub modified: FieldSet,
    /// Present on the right-hand side only.
    pub added: FieldSet,
}

impl Comparison {
    pub fn new() -> Self {
        Comparison::default()
    }

    pub fn is_same(&self) -> bool {
        self.removed.is_empty() && self.modified.is_empty() && self.added.is_empty()
    }

    /// Paths whose value the right-hand side sets: modified and added.
    pub fn changed(&self) -> FieldSet {
        self.modified.union(&self.added)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Modified", &self.modified),
            ("Added", &self.added),
            ("Removed", &self.removed),
        ];
        let mut first = true;
        for (title, set) in sections {
            if set.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "- {} Fields:", title)?;
            for path in set.paths() {
                write!(f, "\n  {}", path)?;
            }
        }
        Ok(())
    }
}
