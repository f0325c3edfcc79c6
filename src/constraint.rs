//! Inclusion constraints over node indices.
//!
//! The four constraint forms cover every pointer-relevant statement after
//! lowering: `copy` for `a = b`, `load` for `a = *b`, `store` for
//! `*a = b`, and `addr_of` for `a = &b`. The analysis is field-insensitive
//! so there is no offset component anywhere.

use std::collections::BTreeSet;
use std::fmt;

use crate::types::NodeIndex;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ConstraintKind {
    /// `dest ⊇ {src}`
    AddrOf,
    /// `pts(dest) ⊇ pts(src)`
    Copy,
    /// `∀ o ∈ pts(src): pts(dest) ⊇ pts(o)`
    Load,
    /// `∀ o ∈ pts(dest): pts(o) ⊇ pts(src)`
    Store,
}

/// A single inclusion constraint.
///
/// Constraints are value-equal when all three fields match and totally
/// ordered lexicographically, which is what the post-optimization dedup
/// relies on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub dest: NodeIndex,
    pub src: NodeIndex,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, dest: NodeIndex, src: NodeIndex) -> Self {
        Self { kind, dest, src }
    }

    pub fn addr_of(dest: NodeIndex, src: NodeIndex) -> Self {
        Self::new(ConstraintKind::AddrOf, dest, src)
    }

    pub fn copy(dest: NodeIndex, src: NodeIndex) -> Self {
        Self::new(ConstraintKind::Copy, dest, src)
    }

    pub fn load(dest: NodeIndex, src: NodeIndex) -> Self {
        Self::new(ConstraintKind::Load, dest, src)
    }

    pub fn store(dest: NodeIndex, src: NodeIndex) -> Self {
        Self::new(ConstraintKind::Store, dest, src)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ConstraintKind::AddrOf => "addr_of",
            ConstraintKind::Copy => "copy",
            ConstraintKind::Load => "load",
            ConstraintKind::Store => "store",
        };
        write!(f, "{} {} {}", kind, self.dest, self.src)
    }
}

/// Removes duplicate constraints, leaving the set sorted.
pub fn uniquify(constraints: &mut Vec<Constraint>) {
    let set: BTreeSet<Constraint> = constraints.drain(..).collect();
    constraints.extend(set);
}
