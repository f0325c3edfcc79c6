//! Generic cycle detection (Nuutila's refinement of Tarjan's SCC).
//!
//! The detector is parameterized by a small graph-view trait so the same
//! driver serves all three users: the HVN predecessor graph, the HCD
//! offline graph, and online lazy cycle detection on the constraint
//! graph. The classic algorithm is recursive on the DFS; worst-case
//! inputs would overflow the machine stack, so the traversal here runs on
//! an explicit frame stack instead. The abstract algorithm is unchanged.

use rustc_hash::{FxHashMap, FxHashSet};

/// A graph view the detector can traverse.
///
/// Nodes are raw `u32` ids so shadow index spaces (which never exist in
/// the node factory) can be traversed too.
pub trait SccGraph {
    /// All node ids to start DFS from when running over the whole graph.
    /// Duplicates are fine; visited nodes are skipped.
    fn nodes(&self) -> Vec<u32>;

    /// Resolves a node to its current representative. Called before every
    /// visit so nodes merged away mid-run are skipped.
    fn rep(&mut self, node: u32) -> u32;

    /// Snapshot of the successors of `node`. Taken once per visit; edge
    /// mutations during the visit do not feed back into the traversal.
    fn children(&self, node: u32) -> Vec<u32>;

    /// Called for every non-representative member of a detected cycle,
    /// before `on_cycle_rep` fires for its representative.
    fn on_cycle_member(&mut self, member: u32, rep: u32);

    /// Called once per closed component (including trivial ones), after
    /// all members have been delivered.
    fn on_cycle_rep(&mut self, rep: u32);
}

struct Frame {
    node: u32,
    stamp: u32,
    children: Vec<u32>,
    next: usize,
}

/// SCC driver state. One instance per detection pass; DFS numbers persist
/// across `run_over_node` calls within the same pass so shared structure
/// is not re-walked.
pub struct CycleDetector {
    scc_stack: Vec<u32>,
    dfs: FxHashMap<u32, u32>,
    in_component: FxHashSet<u32>,
    timestamp: u32,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self {
            scc_stack: Vec::new(),
            dfs: FxHashMap::default(),
            in_component: FxHashSet::default(),
            timestamp: 0,
        }
    }

    /// Runs the detection over every node of the graph once.
    pub fn run_over_graph<G: SccGraph>(&mut self, graph: &mut G) {
        assert!(
            self.scc_stack.is_empty(),
            "SCC stack not empty before cycle detection"
        );
        for node in graph.nodes() {
            let rep = graph.rep(node);
            if !self.dfs.contains_key(&rep) {
                self.visit(graph, rep);
            }
        }
        assert!(
            self.scc_stack.is_empty(),
            "SCC stack not empty after cycle detection"
        );
    }

    /// Runs the detection starting from a single candidate node. Used by
    /// online LCD, where walking the entire graph is not desirable.
    pub fn run_over_node<G: SccGraph>(&mut self, graph: &mut G, node: u32) {
        assert!(
            self.scc_stack.is_empty(),
            "SCC stack not empty before cycle detection"
        );
        let rep = graph.rep(node);
        if !self.dfs.contains_key(&rep) {
            self.visit(graph, rep);
        }
        assert!(
            self.scc_stack.is_empty(),
            "SCC stack not empty after cycle detection"
        );
    }

    fn visit<G: SccGraph>(&mut self, graph: &mut G, root: u32) {
        let stamp = self.next_stamp();
        self.dfs.insert(root, stamp);
        let mut frames = vec![Frame {
            node: root,
            stamp,
            children: graph.children(root),
            next: 0,
        }];

        while let Some(top) = frames.last_mut() {
            if top.next < top.children.len() {
                let child = top.children[top.next];
                top.next += 1;
                let node = top.node;

                let child_rep = graph.rep(child);
                if !self.dfs.contains_key(&child_rep) {
                    let stamp = self.next_stamp();
                    self.dfs.insert(child_rep, stamp);
                    frames.push(Frame {
                        node: child_rep,
                        stamp,
                        children: graph.children(child_rep),
                        next: 0,
                    });
                } else if !self.in_component.contains(&child_rep) {
                    let child_dfs = self.dfs[&child_rep];
                    if self.dfs[&node] > child_dfs {
                        self.dfs.insert(node, child_dfs);
                    }
                }
            } else {
                let Frame { node, stamp, .. } = frames.pop().unwrap();
                let node_dfs = self.dfs[&node];

                if stamp != node_dfs {
                    // Part of a cycle rooted higher up
                    self.scc_stack.push(node);
                } else {
                    // This node closes a component
                    self.in_component.insert(node);
                    while let Some(&member) = self.scc_stack.last() {
                        if self.dfs[&member] < stamp {
                            break;
                        }
                        self.scc_stack.pop();
                        self.in_component.insert(member);
                        graph.on_cycle_member(member, node);
                    }
                    graph.on_cycle_rep(node);
                }

                // Mirror the post-recursion low-link update of the
                // recursive formulation
                if let Some(parent) = frames.last() {
                    if !self.in_component.contains(&node) && self.dfs[&parent.node] > node_dfs {
                        self.dfs.insert(parent.node, node_dfs);
                    }
                }
            }
        }
    }

    fn next_stamp(&mut self) -> u32 {
        let stamp = self.timestamp;
        self.timestamp += 1;
        stamp
    }
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self::new()
    }
}
