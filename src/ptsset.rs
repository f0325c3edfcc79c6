//! Points-to sets and the solved points-to index.
//!
//! [`PtsSet`] is a thin wrapper around the crate's sparse bit set, kept
//! separate so the internal representation can be swapped without touching
//! the solver. [`PointsToIndex`] maps representative nodes to their
//! current set and is the result surface clients query after solving.

use rustc_hash::FxHashMap;

use crate::bitset::SparseBitSet;
use crate::types::NodeIndex;

/// The set of abstract objects a pointer node may point to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtsSet {
    bits: SparseBitSet,
}

impl PtsSet {
    pub fn new() -> Self {
        Self {
            bits: SparseBitSet::new(),
        }
    }

    /// Returns true if `idx` is an element.
    #[inline]
    pub fn has(&self, idx: NodeIndex) -> bool {
        self.bits.contains(idx.raw())
    }

    /// Returns true if the set changed.
    pub fn insert(&mut self, idx: NodeIndex) -> bool {
        self.bits.insert(idx.raw())
    }

    /// Returns true if the set changed.
    pub fn union_with(&mut self, other: &PtsSet) -> bool {
        self.bits.union_with(&other.bits)
    }

    /// Returns true if `self` is a superset of `other`.
    pub fn contains(&self, other: &PtsSet) -> bool {
        self.bits.contains_all(&other.bits)
    }

    /// Returns true if `self` and `other` share points-to elements.
    pub fn intersects(&self, other: &PtsSet) -> bool {
        self.bits.intersects(&other.bits)
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Number of elements. Constant time: the backing set caches it.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always prefer this over `len() == 0` for emptiness tests.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Iterates the elements in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.bits.iter().map(NodeIndex::new)
    }
}

impl FromIterator<NodeIndex> for PtsSet {
    fn from_iter<I: IntoIterator<Item = NodeIndex>>(iter: I) -> Self {
        let mut set = PtsSet::new();
        for idx in iter {
            set.insert(idx);
        }
        set
    }
}

/// Mapping from representative node index to its points-to set.
///
/// Absence of a key means "empty so far". Lookups of merged (non-rep)
/// nodes are the caller's responsibility: resolve through the factory's
/// `find_rep` before consulting the index. Once the solver reaches its
/// fixed point the index is read-only to clients.
#[derive(Debug, Default)]
pub struct PointsToIndex {
    map: FxHashMap<NodeIndex, PtsSet>,
}

impl PointsToIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, n: NodeIndex) -> Option<&PtsSet> {
        self.map.get(&n)
    }

    /// Returns the set for `n`, creating an empty one if absent.
    pub fn entry(&mut self, n: NodeIndex) -> &mut PtsSet {
        self.map.entry(n).or_default()
    }

    pub fn remove(&mut self, n: NodeIndex) -> Option<PtsSet> {
        self.map.remove(&n)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &PtsSet)> {
        self.map.iter().map(|(&n, s)| (n, s))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut PtsSet> {
        self.map.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u32) -> NodeIndex {
        NodeIndex::new(raw)
    }

    #[test]
    fn test_basic_ops() {
        let mut s1 = PtsSet::new();
        let mut s2 = PtsSet::new();
        assert!(s1.is_empty());
        assert!(s2.is_empty());

        assert!(s1.insert(n(5)));
        assert!(s2.insert(n(10)));
        assert!(s1.has(n(5)));
        assert!(!s1.has(n(10)));
        assert!(!s2.has(n(5)));
        assert!(s2.has(n(10)));
        assert!(!s1.intersects(&s2));

        assert!(s1.insert(n(15)));
        assert!(s2.insert(n(15)));
        assert!(!s2.insert(n(10)));
        assert!(s1.intersects(&s2));

        assert!(s1.union_with(&s2));
        assert!(s1.contains(&s2));
        assert_eq!(s1.len(), 3);
    }

    #[test]
    fn test_iteration_ascending() {
        let set: PtsSet = [n(90), n(4), n(65)].into_iter().collect();
        let out: Vec<_> = set.iter().collect();
        assert_eq!(out, vec![n(4), n(65), n(90)]);
    }

    #[test]
    fn test_value_equality() {
        let a: PtsSet = [n(1), n(2)].into_iter().collect();
        let b: PtsSet = [n(2), n(1)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_index_entry() {
        let mut index = PointsToIndex::new();
        assert!(index.get(n(3)).is_none());
        index.entry(n(3)).insert(n(7));
        assert!(index.get(n(3)).unwrap().has(n(7)));
        assert_eq!(index.len(), 1);
        let removed = index.remove(n(3)).unwrap();
        assert!(removed.has(n(7)));
        assert!(index.is_empty());
    }
}
