//! Type-safe wrapper for node indices.
//!
//! Every cross-reference in the analysis is a dense integer index into the
//! [`NodeFactory`][crate::node::NodeFactory]; no structure ever holds a
//! pointer to another node. This module provides the newtype that keeps
//! node indices from being confused with the virtual shadow indices used
//! by the offline passes (those are plain `u32` arithmetic over a frozen
//! node count and never index into the factory).

use std::fmt;

/// A dense node index (0-based).
///
/// # Invariants
///
/// - Indices are assigned consecutively by the factory and never reused.
/// - A value index is never reused as an object index and vice versa.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
    /// Creates a node index from its raw value.
    pub const fn new(raw: u32) -> Self {
        NodeIndex(raw)
    }

    /// Returns the raw index as a `u32`.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<NodeIndex> for u32 {
    fn from(idx: NodeIndex) -> Self {
        idx.0
    }
}
