//! Directed graph with sparse-bitset successor sets.
//!
//! Used by the offline passes, whose node spaces include the virtual
//! REF/ADR shadow indices and are therefore keyed by raw `u32`.

use rustc_hash::FxHashMap;

use crate::bitset::SparseBitSet;

#[derive(Debug, Default)]
pub struct SparseBitVectorGraph {
    graph: FxHashMap<u32, SparseBitSet>,
}

impl SparseBitVectorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the edge was not already present.
    pub fn insert_edge(&mut self, src: u32, dst: u32) -> bool {
        self.graph.entry(src).or_default().insert(dst)
    }

    /// `dst`'s successors += `src`'s successors.
    pub fn merge_edges(&mut self, dst: u32, src: u32) {
        if dst == src {
            return;
        }
        let Some(src_succs) = self.graph.get(&src).cloned() else {
            return;
        };
        self.graph.entry(dst).or_default().union_with(&src_succs);
    }

    pub fn succs(&self, n: u32) -> Option<&SparseBitSet> {
        self.graph.get(&n)
    }

    /// Iterates over the nodes that have at least one outgoing edge.
    pub fn nodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.graph.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_edge() {
        let mut g = SparseBitVectorGraph::new();
        assert!(g.insert_edge(1, 2));
        assert!(!g.insert_edge(1, 2));
        assert!(g.insert_edge(1, 3));
        let succs: Vec<_> = g.succs(1).unwrap().iter().collect();
        assert_eq!(succs, vec![2, 3]);
        assert!(g.succs(2).is_none());
    }

    #[test]
    fn test_merge_edges() {
        let mut g = SparseBitVectorGraph::new();
        g.insert_edge(1, 2);
        g.insert_edge(5, 7);
        g.insert_edge(5, 9);
        g.merge_edges(1, 5);
        let succs: Vec<_> = g.succs(1).unwrap().iter().collect();
        assert_eq!(succs, vec![2, 7, 9]);
        // Source keeps its edges; only the target gains
        assert_eq!(g.succs(5).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_from_missing_node() {
        let mut g = SparseBitVectorGraph::new();
        g.insert_edge(1, 2);
        g.merge_edges(1, 42);
        assert_eq!(g.succs(1).unwrap().len(), 1);
    }
}
