// id.rs — Process identifiers and the fresh-Id generator
//
// Ids are opaque string keys, unique within a ProcessNetwork. They order
// lexicographically, which gives every traversal a deterministic iteration
// order independent of insertion history.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, totally ordered identifier of a process or port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(s: impl Into<String>) -> Self {
        Id(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id(s)
    }
}

/// Generator for fresh process Ids.
///
/// Produces `<prefix><n>` with a monotonically increasing counter. Every Id
/// handed out (or reserved through [`IdGenerator::reserve`]) is remembered,
/// so a candidate that already exists in the network is skipped rather than
/// returned.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    next: u64,
    taken: BTreeSet<Id>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an externally created Id as taken.
    pub fn reserve(&mut self, id: &Id) {
        self.taken.insert(id.clone());
    }

    /// Allocate a fresh Id with the given prefix.
    pub fn fresh(&mut self, prefix: &str) -> Id {
        loop {
            let candidate = Id(format!("{}{}", prefix, self.next));
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_monotonic() {
        let mut gen = IdGenerator::new();
        assert_eq!(gen.fresh("_p"), Id::new("_p0"));
        assert_eq!(gen.fresh("_p"), Id::new("_p1"));
    }

    #[test]
    fn fresh_skips_reserved_ids() {
        let mut gen = IdGenerator::new();
        gen.reserve(&Id::new("_p0"));
        gen.reserve(&Id::new("_p1"));
        assert_eq!(gen.fresh("_p"), Id::new("_p2"));
    }

    #[test]
    fn ids_order_lexicographically() {
        let mut ids = vec![Id::new("b"), Id::new("a2"), Id::new("a10")];
        ids.sort();
        assert_eq!(ids, vec![Id::new("a10"), Id::new("a2"), Id::new("b")]);
    }
}
