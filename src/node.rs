//! Nodes and the node factory.
//!
//! Every pointer variable and abstract memory object is a [`Node`] with a
//! dense index. Nodes live in a vector owned by the [`NodeFactory`] for
//! the whole analysis; merging never moves storage, it only rewrites the
//! merge target, so indices held elsewhere stay valid and resolve through
//! [`NodeFactory::find_rep`].
//!
//! Ordinary clients are not allowed to construct nodes directly: index
//! consistency is guaranteed by going through the factory.

use log::debug;
use rustc_hash::FxHashMap;

use crate::ir::{FuncRef, ValueRef};
use crate::types::NodeIndex;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NodeKind {
    /// A top-level pointer-holding variable.
    Value,
    /// An abstract memory object (global, stack slot, or heap cell).
    Object,
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    index: NodeIndex,
    value: Option<ValueRef>,
    /// Union-find parent. `merge_target == index` means this node is a
    /// representative.
    merge_target: NodeIndex,
}

impl Node {
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    #[inline]
    pub fn value(&self) -> Option<ValueRef> {
        self.value
    }
}

/// Allocator and owner of all nodes.
///
/// The four reserved nodes are created at construction, in this order:
/// the universal pointer, the universal object, the null pointer, and the
/// null object. They must remain union-find roots for the lifetime of the
/// analysis.
pub struct NodeFactory {
    nodes: Vec<Node>,
    value_map: FxHashMap<ValueRef, NodeIndex>,
    obj_map: FxHashMap<ValueRef, NodeIndex>,
    /// One entry per function that returns a pointer.
    return_map: FxHashMap<FuncRef, NodeIndex>,
    /// One entry per variadic function: the object standing for all
    /// pointers passed through its variadic portion.
    vararg_map: FxHashMap<FuncRef, NodeIndex>,
}

impl NodeFactory {
    /// The pointer we know nothing about.
    pub const UNIVERSAL_PTR: NodeIndex = NodeIndex::new(0);
    /// The catch-all object; any set containing it collapses to it alone.
    pub const UNIVERSAL_OBJ: NodeIndex = NodeIndex::new(1);
    /// The null pointer constant.
    pub const NULL_PTR: NodeIndex = NodeIndex::new(2);
    /// The object the null pointer points to.
    pub const NULL_OBJ: NodeIndex = NodeIndex::new(3);

    const NUM_RESERVED: u32 = 4;

    pub fn new() -> Self {
        let mut factory = Self {
            nodes: Vec::new(),
            value_map: FxHashMap::default(),
            obj_map: FxHashMap::default(),
            return_map: FxHashMap::default(),
            vararg_map: FxHashMap::default(),
        };
        factory.alloc(NodeKind::Value, None); // universal ptr
        factory.alloc(NodeKind::Object, None); // universal obj
        factory.alloc(NodeKind::Value, None); // null ptr
        factory.alloc(NodeKind::Object, None); // null obj
        debug_assert_eq!(factory.nodes.len(), Self::NUM_RESERVED as usize);
        factory
    }

    fn alloc(&mut self, kind: NodeKind, value: Option<ValueRef>) -> NodeIndex {
        let index = NodeIndex::new(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            index,
            value,
            merge_target: index,
        });
        index
    }

    pub fn create_value_node(&mut self, value: Option<ValueRef>) -> NodeIndex {
        let index = self.alloc(NodeKind::Value, value);
        if let Some(v) = value {
            let prev = self.value_map.insert(v, index);
            assert!(prev.is_none(), "{} already has a value node", v);
        }
        index
    }

    pub fn create_object_node(&mut self, value: Option<ValueRef>) -> NodeIndex {
        let index = self.alloc(NodeKind::Object, value);
        if let Some(v) = value {
            let prev = self.obj_map.insert(v, index);
            assert!(prev.is_none(), "{} already has an object node", v);
        }
        index
    }

    pub fn create_return_node(&mut self, f: FuncRef) -> NodeIndex {
        let index = self.alloc(NodeKind::Value, None);
        let prev = self.return_map.insert(f, index);
        assert!(prev.is_none(), "{} already has a return node", f);
        index
    }

    pub fn create_vararg_node(&mut self, f: FuncRef) -> NodeIndex {
        let index = self.alloc(NodeKind::Object, None);
        let prev = self.vararg_map.insert(f, index);
        assert!(prev.is_none(), "{} already has a vararg node", f);
        index
    }

    pub fn value_node_for(&self, v: ValueRef) -> Option<NodeIndex> {
        self.value_map.get(&v).copied()
    }

    pub fn object_node_for(&self, v: ValueRef) -> Option<NodeIndex> {
        self.obj_map.get(&v).copied()
    }

    pub fn return_node_for(&self, f: FuncRef) -> Option<NodeIndex> {
        self.return_map.get(&f).copied()
    }

    pub fn vararg_node_for(&self, f: FuncRef) -> Option<NodeIndex> {
        self.vararg_map.get(&f).copied()
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, n: NodeIndex) -> &Node {
        assert!(
            (n.raw() as usize) < self.nodes.len(),
            "Node index {} out of range",
            n
        );
        &self.nodes[n.raw() as usize]
    }

    #[inline]
    pub fn kind(&self, n: NodeIndex) -> NodeKind {
        self.node(n).kind
    }

    #[inline]
    pub fn is_value_node(&self, n: NodeIndex) -> bool {
        self.node(n).kind == NodeKind::Value
    }

    #[inline]
    pub fn is_object_node(&self, n: NodeIndex) -> bool {
        self.node(n).kind == NodeKind::Object
    }

    /// The IR entity this node was created for, if any.
    #[inline]
    pub fn value_of(&self, n: NodeIndex) -> Option<ValueRef> {
        self.node(n).value
    }

    #[inline]
    pub fn is_reserved(n: NodeIndex) -> bool {
        n.raw() < Self::NUM_RESERVED
    }

    /// Records that `drop` is now represented by `keep`.
    ///
    /// The caller is responsible for transferring `drop`'s outgoing data
    /// (points-to set and graph edges) to `keep`.
    pub fn merge(&mut self, keep: NodeIndex, drop: NodeIndex) {
        assert_ne!(keep, drop, "Trying to merge node {} with itself", keep);
        assert!(
            !Self::is_reserved(drop),
            "Reserved node {} must remain a representative",
            drop
        );
        let keep = self.node(keep).index; // range check
        self.nodes[drop.raw() as usize].merge_target = keep;
        debug!("merged {} into {}", drop, keep);
    }

    /// Returns the representative of `n`, compressing the path.
    pub fn find_rep(&mut self, n: NodeIndex) -> NodeIndex {
        let mut root = self.node(n).merge_target;
        loop {
            let next = self.nodes[root.raw() as usize].merge_target;
            if next == root {
                break;
            }
            root = next;
        }
        // Path compression
        let mut cur = n;
        while cur != root {
            let next = self.nodes[cur.raw() as usize].merge_target;
            self.nodes[cur.raw() as usize].merge_target = root;
            cur = next;
        }
        root
    }

    /// Representative lookup without path compression, for read-only
    /// query contexts.
    pub fn rep(&self, n: NodeIndex) -> NodeIndex {
        let mut cur = self.node(n).merge_target;
        loop {
            let next = self.nodes[cur.raw() as usize].merge_target;
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }

    /// Every IR value that owns a memory object, i.e. the allocation
    /// sites of the module. Sorted for deterministic output.
    pub fn allocation_sites(&self) -> Vec<ValueRef> {
        let mut sites: Vec<ValueRef> = self.obj_map.keys().copied().collect();
        sites.sort_unstable();
        sites
    }

    /// Logs one line per node and one per non-trivial merge chain.
    pub fn dump(&self) {
        for node in &self.nodes {
            let kind = match node.kind {
                NodeKind::Value => "V",
                NodeKind::Object => "O",
            };
            match node.value {
                Some(v) => debug!("[{} {}] val = {}", kind, node.index, v),
                None => debug!("[{} {}] val = <none>", kind, node.index),
            }
        }
        for node in &self.nodes {
            let rep = self.rep(node.index);
            if rep != node.index {
                debug!("{} -> {}", node.index, rep);
            }
        }
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_nodes() {
        let factory = NodeFactory::new();
        assert_eq!(factory.num_nodes(), 4);
        assert_eq!(factory.kind(NodeFactory::UNIVERSAL_PTR), NodeKind::Value);
        assert_eq!(factory.kind(NodeFactory::UNIVERSAL_OBJ), NodeKind::Object);
        assert_eq!(factory.kind(NodeFactory::NULL_PTR), NodeKind::Value);
        assert_eq!(factory.kind(NodeFactory::NULL_OBJ), NodeKind::Object);
    }

    #[test]
    fn test_create_and_lookup() {
        let mut factory = NodeFactory::new();
        let v = ValueRef::new(0);
        let idx = factory.create_value_node(Some(v));
        assert_eq!(idx.raw(), 4);
        assert_eq!(factory.value_node_for(v), Some(idx));
        assert_eq!(factory.object_node_for(v), None);

        let obj = factory.create_object_node(Some(v));
        assert_eq!(obj.raw(), 5);
        assert_eq!(factory.object_node_for(v), Some(obj));
    }

    #[test]
    #[should_panic(expected = "already has a value node")]
    fn test_duplicate_value_node_panics() {
        let mut factory = NodeFactory::new();
        let v = ValueRef::new(0);
        factory.create_value_node(Some(v));
        factory.create_value_node(Some(v));
    }

    #[test]
    fn test_return_and_vararg_nodes() {
        let mut factory = NodeFactory::new();
        let f = FuncRef::new(0);
        let ret = factory.create_return_node(f);
        let va = factory.create_vararg_node(f);
        assert_eq!(factory.kind(ret), NodeKind::Value);
        assert_eq!(factory.kind(va), NodeKind::Object);
        assert_eq!(factory.return_node_for(f), Some(ret));
        assert_eq!(factory.vararg_node_for(f), Some(va));
    }

    #[test]
    fn test_union_find() {
        let mut factory = NodeFactory::new();
        let a = factory.create_value_node(None);
        let b = factory.create_value_node(None);
        let c = factory.create_value_node(None);

        assert_eq!(factory.find_rep(a), a);
        factory.merge(a, b);
        factory.merge(b, c);
        assert_eq!(factory.find_rep(c), a);
        assert_eq!(factory.find_rep(b), a);
        // find_rep is idempotent
        assert_eq!(factory.find_rep(factory.rep(c)), a);
    }

    #[test]
    #[should_panic(expected = "must remain a representative")]
    fn test_merge_reserved_panics() {
        let mut factory = NodeFactory::new();
        let a = factory.create_value_node(None);
        factory.merge(a, NodeFactory::NULL_PTR);
    }
}
