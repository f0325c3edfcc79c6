//! The online constraint solver.
//!
//! Iteratively propagates points-to sets along copy edges and resolves
//! load/store constraints into new copy edges until a fixed point is
//! reached. Cycles in the constraint graph are collapsed on the fly with
//! two complementary techniques from "The Ant and the Grasshopper: Fast
//! and Accurate Pointer Analysis for Millions of Lines of Code" (PLDI
//! 2007):
//!
//! - **HCD** (hybrid cycle detection) runs an SCC pass over an offline
//!   graph before solving. Components found there yield collapse
//!   directives: whenever node `n` with a recorded target gains points-to
//!   elements, those elements are merged with the target immediately.
//! - **LCD** (lazy cycle detection) watches copy edges whose endpoints
//!   momentarily have identical points-to sets. Such edges are flagged
//!   once, and all flagged candidates are cycle-checked together at the
//!   start of the next iteration, which is significantly cheaper than
//!   detecting one node at a time.
//!
//! Every step either strictly enlarges some points-to set or merges two
//! representatives, so termination is guaranteed.

use std::collections::VecDeque;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::congraph::ConstraintGraph;
use crate::constraint::{Constraint, ConstraintKind};
use crate::graph::SparseBitVectorGraph;
use crate::node::NodeFactory;
use crate::ptsset::{PointsToIndex, PtsSet};
use crate::scc::{CycleDetector, SccGraph};
use crate::types::NodeIndex;

/// FIFO worklist with set-backed dedup.
struct Worklist {
    queue: VecDeque<NodeIndex>,
    set: FxHashSet<NodeIndex>,
}

impl Worklist {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            set: FxHashSet::default(),
        }
    }

    fn enqueue(&mut self, n: NodeIndex) {
        if self.set.insert(n) {
            self.queue.push_back(n);
        }
    }

    fn dequeue(&mut self) -> Option<NodeIndex> {
        let n = self.queue.pop_front()?;
        self.set.remove(&n);
        Some(n)
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// The universal object is size-1 absorbing: once a set contains it, the
/// set collapses to exactly it.
fn absorb_universal(set: &mut PtsSet) {
    if set.len() > 1 && set.has(NodeFactory::UNIVERSAL_OBJ) {
        set.clear();
        set.insert(NodeFactory::UNIVERSAL_OBJ);
    }
}

/// Merges `b` into `a` (or the other way around if `b` is reserved):
/// union-find target, constraint graph edges, and points-to set all move
/// to the survivor. Returns the surviving representative.
fn merge_nodes(
    factory: &mut NodeFactory,
    graph: &mut ConstraintGraph,
    pts: &mut PointsToIndex,
    a: NodeIndex,
    b: NodeIndex,
) -> NodeIndex {
    let a = factory.find_rep(a);
    let b = factory.find_rep(b);
    if a == b {
        return a;
    }
    let (keep, drop) = if NodeFactory::is_reserved(b) {
        (b, a)
    } else {
        (a, b)
    };
    factory.merge(keep, drop);
    graph.merge_into(keep, drop);
    if let Some(dropped) = pts.remove(drop) {
        let set = pts.entry(keep);
        set.union_with(&dropped);
        absorb_universal(set);
    }
    keep
}

/// Offline HCD: SCC over real + REF shadow indices. For each non-trivial
/// component, the lowest-numbered real node becomes the representative,
/// the other real members are merged into it right away, and every REF
/// member becomes a collapse directive for the online phase.
struct HcdDriver<'a> {
    factory: &'a mut NodeFactory,
    graph: &'a SparseBitVectorGraph,
    num_nodes: u32,
    scc: Vec<u32>,
    merges: Vec<(NodeIndex, NodeIndex)>,
    collapse: &'a mut FxHashMap<NodeIndex, NodeIndex>,
}

impl SccGraph for HcdDriver<'_> {
    fn nodes(&self) -> Vec<u32> {
        let mut nodes = Vec::with_capacity(2 * self.num_nodes as usize);
        for i in 0..self.num_nodes {
            let rep = self.factory.rep(NodeIndex::new(i)).raw();
            nodes.push(rep);
            nodes.push(rep + self.num_nodes);
        }
        nodes
    }

    fn rep(&mut self, node: u32) -> u32 {
        if node >= self.num_nodes {
            node
        } else {
            self.factory.find_rep(NodeIndex::new(node)).raw()
        }
    }

    fn children(&self, node: u32) -> Vec<u32> {
        self.graph
            .succs(node)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }

    fn on_cycle_member(&mut self, member: u32, _rep: u32) {
        self.scc.push(member);
    }

    fn on_cycle_rep(&mut self, rep: u32) {
        if self.scc.is_empty() {
            return; // trivial component
        }
        self.scc.push(rep);

        let real = self
            .scc
            .iter()
            .copied()
            .filter(|&x| x < self.num_nodes)
            .min()
            .expect("HCD component without a real node");
        let keep = NodeIndex::new(real);

        for &member in &self.scc {
            if member == real {
                continue;
            }
            if member >= self.num_nodes {
                // *v and keep are in one cycle: whatever v points to at
                // solve time collapses with keep immediately
                let v = NodeIndex::new(member - self.num_nodes);
                debug!("hcd: collapse target of {} is {}", v, keep);
                self.collapse.insert(v, keep);
            } else {
                // Deferred so the DFS in progress is not disturbed
                self.merges.push((keep, NodeIndex::new(member)));
            }
        }
        self.scc.clear();
    }
}

/// Online LCD over the copy edges of the constraint graph. Detected
/// members are merged into their component representative on the spot.
struct LcdDriver<'a> {
    factory: &'a mut NodeFactory,
    graph: &'a mut ConstraintGraph,
    pts: &'a mut PointsToIndex,
    merged_reps: Vec<NodeIndex>,
}

impl SccGraph for LcdDriver<'_> {
    fn nodes(&self) -> Vec<u32> {
        Vec::new() // driven per candidate through run_over_node
    }

    fn rep(&mut self, node: u32) -> u32 {
        self.factory.find_rep(NodeIndex::new(node)).raw()
    }

    fn children(&self, node: u32) -> Vec<u32> {
        self.graph
            .node(NodeIndex::new(node))
            .map(|sets| sets.copies().map(NodeIndex::raw).collect())
            .unwrap_or_default()
    }

    fn on_cycle_member(&mut self, member: u32, rep: u32) {
        debug!("lcd: collapsing n{} into n{}", member, rep);
        let survivor = merge_nodes(
            self.factory,
            self.graph,
            self.pts,
            NodeIndex::new(rep),
            NodeIndex::new(member),
        );
        self.merged_reps.push(survivor);
    }

    fn on_cycle_rep(&mut self, _rep: u32) {}
}

pub struct Solver<'a> {
    factory: &'a mut NodeFactory,
    pts: &'a mut PointsToIndex,
    graph: ConstraintGraph,
    collapse: FxHashMap<NodeIndex, NodeIndex>,
    enable_hcd: bool,
    enable_lcd: bool,
}

/// Solves the constraint set to its least fixed point. The factory
/// receives the merges performed by cycle collapsing; `pts` receives the
/// solution.
pub fn solve(
    factory: &mut NodeFactory,
    constraints: &[Constraint],
    pts: &mut PointsToIndex,
    enable_hcd: bool,
    enable_lcd: bool,
) {
    Solver {
        factory,
        pts,
        graph: ConstraintGraph::new(),
        collapse: FxHashMap::default(),
        enable_hcd,
        enable_lcd,
    }
    .run(constraints);
}

impl Solver<'_> {
    fn run(&mut self, constraints: &[Constraint]) {
        if self.enable_hcd {
            self.offline_hcd(constraints);
        }
        self.build_graph(constraints);

        // Two worklists, swapped at the bottom of each outer iteration
        let mut current = Worklist::new();
        let mut next = Worklist::new();
        // Nodes LCD suspects to be on a cycle, and edges already checked
        let mut cycle_candidates: FxHashSet<NodeIndex> = FxHashSet::default();
        let mut checked_edges: FxHashSet<(NodeIndex, NodeIndex)> = FxHashSet::default();

        for i in 0..self.factory.num_nodes() as u32 {
            let n = NodeIndex::new(i);
            if self.factory.find_rep(n) == n
                && self.pts.get(n).is_some_and(|s| !s.is_empty())
                && self.graph.has_node(n)
            {
                current.enqueue(n);
            }
        }

        while !current.is_empty() {
            if self.enable_lcd && !cycle_candidates.is_empty() {
                self.detect_cycles(&cycle_candidates, &mut current);
                cycle_candidates.clear();
            }

            while let Some(n) = current.dequeue() {
                let n = self.factory.find_rep(n);
                self.process_node(n, &mut next, &mut cycle_candidates, &mut checked_edges);
            }

            std::mem::swap(&mut current, &mut next);
        }
    }

    /// Builds the offline HCD graph and turns its components into merges
    /// and collapse directives.
    fn offline_hcd(&mut self, constraints: &[Constraint]) {
        let num = self.factory.num_nodes() as u32;
        let mut graph = SparseBitVectorGraph::new();
        for c in constraints {
            let s = self.factory.find_rep(c.src).raw();
            let d = self.factory.find_rep(c.dest).raw();
            match c.kind {
                ConstraintKind::AddrOf => {}
                ConstraintKind::Copy => {
                    graph.insert_edge(s, d);
                }
                ConstraintKind::Load => {
                    graph.insert_edge(s + num, d);
                }
                ConstraintKind::Store => {
                    graph.insert_edge(s, d + num);
                }
            }
        }

        let mut driver = HcdDriver {
            factory: &mut *self.factory,
            graph: &graph,
            num_nodes: num,
            scc: Vec::new(),
            merges: Vec::new(),
            collapse: &mut self.collapse,
        };
        CycleDetector::new().run_over_graph(&mut driver);

        let merges = driver.merges;
        for (keep, drop) in merges {
            let keep = self.factory.find_rep(keep);
            let drop = self.factory.find_rep(drop);
            if keep == drop {
                continue;
            }
            let (keep, drop) = if NodeFactory::is_reserved(drop) {
                (drop, keep)
            } else {
                (keep, drop)
            };
            debug!("hcd: merging {} into {}", drop, keep);
            self.factory.merge(keep, drop);
        }
    }

    fn build_graph(&mut self, constraints: &[Constraint]) {
        for c in constraints {
            let s = self.factory.find_rep(c.src);
            let d = self.factory.find_rep(c.dest);
            match c.kind {
                ConstraintKind::AddrOf => {
                    // The original src, not its rep: the address of a
                    // variable is not the address of whatever it was
                    // merged with
                    let set = self.pts.entry(d);
                    set.insert(c.src);
                    absorb_universal(set);
                }
                ConstraintKind::Copy => {
                    self.graph.insert_copy_edge(s, d);
                }
                ConstraintKind::Load => {
                    self.graph.insert_load_edge(s, d);
                }
                ConstraintKind::Store => {
                    // Inverted: iteration starts from the pointer whose
                    // points-to set drives the resolution
                    self.graph.insert_store_edge(d, s);
                }
            }
        }
        // Unknown memory includes itself; without this the universal
        // object would never flow anywhere
        let universal = self.factory.find_rep(NodeFactory::UNIVERSAL_OBJ);
        self.pts.entry(universal).insert(NodeFactory::UNIVERSAL_OBJ);
    }

    fn detect_cycles(&mut self, candidates: &FxHashSet<NodeIndex>, current: &mut Worklist) {
        let mut driver = LcdDriver {
            factory: &mut *self.factory,
            graph: &mut self.graph,
            pts: &mut *self.pts,
            merged_reps: Vec::new(),
        };
        let mut detector = CycleDetector::new();
        for &candidate in candidates {
            detector.run_over_node(&mut driver, candidate.raw());
        }
        let merged = driver.merged_reps;
        for rep in merged {
            current.enqueue(self.factory.find_rep(rep));
        }
    }

    fn process_node(
        &mut self,
        n: NodeIndex,
        next: &mut Worklist,
        candidates: &mut FxHashSet<NodeIndex>,
        checked: &mut FxHashSet<(NodeIndex, NodeIndex)>,
    ) {
        // HCD fast path: everything n points to collapses with the
        // recorded target
        if self.enable_hcd {
            if let Some(&target) = self.collapse.get(&n) {
                let elems: Vec<NodeIndex> = match self.pts.get(n) {
                    Some(set) => set.iter().collect(),
                    None => Vec::new(),
                };
                if !elems.is_empty() {
                    let mut keep = self.factory.find_rep(target);
                    let mut merge_self = false;
                    for &o in &elems {
                        let o = self.factory.find_rep(o);
                        if o == n {
                            // Deferred: merging n away mid-loop would
                            // invalidate the set being drained
                            merge_self = true;
                            continue;
                        }
                        keep = merge_nodes(self.factory, &mut self.graph, self.pts, keep, o);
                    }
                    if merge_self {
                        keep = merge_nodes(self.factory, &mut self.graph, self.pts, keep, n);
                    }
                    next.enqueue(keep);
                    if self.factory.find_rep(n) != n {
                        // n itself was absorbed; the new rep takes over
                        return;
                    }
                }
            }
        }

        let Some(set) = self.pts.get(n) else {
            return;
        };
        if set.is_empty() {
            return;
        }
        let pts_elems: Vec<NodeIndex> = set.iter().collect();

        let Some(sets) = self.graph.node(n) else {
            return;
        };
        let load_targets: Vec<NodeIndex> = sets.loads().collect();
        let store_targets: Vec<NodeIndex> = sets.stores().collect();
        let copy_targets: Vec<NodeIndex> = sets.copies().collect();

        // Resolve loads: t ⊇ *n becomes a copy edge from each pointee
        let mut retargets = Vec::new();
        for &t in &load_targets {
            let tr = self.factory.find_rep(t);
            if tr != t {
                retargets.push((t, tr));
            }
            for &o in &pts_elems {
                let o = self.factory.find_rep(o);
                if self.graph.insert_copy_edge(o, tr) {
                    debug!("load: new copy edge {} -> {}", o, tr);
                    next.enqueue(o);
                }
            }
        }
        if !retargets.is_empty() {
            self.graph.replace_load_edges(n, &retargets);
        }

        // Resolve stores: *n ⊇ t becomes a copy edge into each pointee
        let mut retargets = Vec::new();
        for &t in &store_targets {
            let tr = self.factory.find_rep(t);
            if tr != t {
                retargets.push((t, tr));
            }
            for &o in &pts_elems {
                let o = self.factory.find_rep(o);
                if self.graph.insert_copy_edge(tr, o) {
                    debug!("store: new copy edge {} -> {}", tr, o);
                    next.enqueue(tr);
                }
            }
        }
        if !retargets.is_empty() {
            self.graph.replace_store_edges(n, &retargets);
        }

        // Propagate along copy edges
        let src_set = self.pts.get(n).cloned().unwrap_or_default();
        let mut retargets = Vec::new();
        for &t in &copy_targets {
            let tr = self.factory.find_rep(t);
            if tr != t {
                retargets.push((t, tr));
            }
            if tr == n {
                continue;
            }
            let target_set = self.pts.entry(tr);
            if target_set.union_with(&src_set) {
                absorb_universal(target_set);
                next.enqueue(tr);
            } else if self.enable_lcd && *target_set == src_set && !checked.contains(&(n, tr)) {
                // Equal sets across an unchecked edge: a cycle suspect
                checked.insert((n, tr));
                candidates.insert(tr);
            }
        }
        if !retargets.is_empty() {
            self.graph.replace_copy_edges(n, &retargets);
        }
    }
}
