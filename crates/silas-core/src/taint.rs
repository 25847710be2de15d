//! The provenance taint lattice: `owner < auth < external`, joined by maximum.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Provenance tag carried by every message, tool output, and response.
///
/// Ordered `Owner < Auth < External`; the join of all taints touched during
/// a turn is the taint stamped on that turn's output (I-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taint {
    /// Content originated from the workspace owner.
    Owner,
    /// Content originated from an authenticated-but-non-owner principal.
    Auth,
    /// Content originated externally (default for unclassified tool output).
    External,
}

impl Taint {
    fn rank(self) -> u8 {
        match self {
            Taint::Owner => 0,
            Taint::Auth => 1,
            Taint::External => 2,
        }
    }

    /// Join (least upper bound) of two taints: the more restrictive of the two.
    #[must_use]
    pub fn join(self, other: Taint) -> Taint {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    /// Join an iterator of taints, defaulting to `Owner` (the lattice bottom)
    /// when the iterator is empty.
    pub fn join_all(taints: impl IntoIterator<Item = Taint>) -> Taint {
        taints
            .into_iter()
            .fold(Taint::Owner, |acc, t| acc.join(t))
    }
}

impl PartialOrd for Taint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Taint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Default for Taint {
    fn default() -> Self {
        Taint::External
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_picks_more_restrictive() {
        assert_eq!(Taint::Owner.join(Taint::Auth), Taint::Auth);
        assert_eq!(Taint::Auth.join(Taint::External), Taint::External);
        assert_eq!(Taint::Owner.join(Taint::Owner), Taint::Owner);
    }

    #[test]
    fn join_all_empty_is_owner() {
        assert_eq!(Taint::join_all(std::iter::empty()), Taint::Owner);
    }

    #[test]
    fn join_all_mixed() {
        let joined = Taint::join_all([Taint::Owner, Taint::Auth, Taint::Owner]);
        assert_eq!(joined, Taint::Auth);
    }

    #[test]
    fn ordering_matches_spec_lattice() {
        assert!(Taint::Owner < Taint::Auth);
        assert!(Taint::Auth < Taint::External);
    }
}
