//! The online constraint graph.
//!
//! Each node carries three disjoint colored out-edge sets: copies, loads,
//! and stores. Keeping the colors separate means the hot propagation loop
//! iterates copy edges only, so its cost is bounded by the amount of
//! actual dataflow rather than by the number of indirect constraints.

use rustc_hash::FxHashMap;

use crate::bitset::SparseBitSet;
use crate::types::NodeIndex;

#[derive(Debug, Clone, Default)]
pub struct EdgeSets {
    copy: SparseBitSet,
    load: SparseBitSet,
    store: SparseBitSet,
}

impl EdgeSets {
    pub fn copies(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.copy.iter().map(NodeIndex::new)
    }

    pub fn loads(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.load.iter().map(NodeIndex::new)
    }

    pub fn stores(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.store.iter().map(NodeIndex::new)
    }
}

#[derive(Debug, Default)]
pub struct ConstraintGraph {
    graph: FxHashMap<NodeIndex, EdgeSets>,
}

impl ConstraintGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the edge was not already present.
    pub fn insert_copy_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.graph.entry(src).or_default().copy.insert(dst.raw())
    }

    pub fn insert_load_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.graph.entry(src).or_default().load.insert(dst.raw())
    }

    pub fn insert_store_edge(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.graph.entry(src).or_default().store.insert(dst.raw())
    }

    pub fn node(&self, n: NodeIndex) -> Option<&EdgeSets> {
        self.graph.get(&n)
    }

    pub fn has_node(&self, n: NodeIndex) -> bool {
        self.graph.contains_key(&n)
    }

    pub fn delete_node(&mut self, n: NodeIndex) {
        self.graph.remove(&n);
    }

    /// Appends all three edge sets of `src` to `dst` and erases `src`.
    ///
    /// Edges elsewhere that still point at `src` are left dangling on
    /// purpose; they get retargeted lazily through `replace_*_edges`
    /// when the solver next touches them.
    pub fn merge_into(&mut self, dst: NodeIndex, src: NodeIndex) {
        if dst == src {
            return;
        }
        let Some(sets) = self.graph.remove(&src) else {
            return;
        };
        let target = self.graph.entry(dst).or_default();
        target.copy.union_with(&sets.copy);
        target.load.union_with(&sets.load);
        target.store.union_with(&sets.store);
    }

    /// Retargets copy edges of `n` in bulk: each `(old, new)` pair moves
    /// the edge `n -> old` to `n -> new`.
    pub fn replace_copy_edges(&mut self, n: NodeIndex, retargets: &[(NodeIndex, NodeIndex)]) {
        if let Some(sets) = self.graph.get_mut(&n) {
            for &(old, new) in retargets {
                if sets.copy.remove(old.raw()) {
                    sets.copy.insert(new.raw());
                }
            }
        }
    }

    pub fn replace_load_edges(&mut self, n: NodeIndex, retargets: &[(NodeIndex, NodeIndex)]) {
        if let Some(sets) = self.graph.get_mut(&n) {
            for &(old, new) in retargets {
                if sets.load.remove(old.raw()) {
                    sets.load.insert(new.raw());
                }
            }
        }
    }

    pub fn replace_store_edges(&mut self, n: NodeIndex, retargets: &[(NodeIndex, NodeIndex)]) {
        if let Some(sets) = self.graph.get_mut(&n) {
            for &(old, new) in retargets {
                if sets.store.remove(old.raw()) {
                    sets.store.insert(new.raw());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}
