//! Offline constraint optimization: hash-based value numbering (HVN).
//!
//! HVN discovers *pointer-equivalent* variables before the solver runs:
//! variables guaranteed to end up with identical points-to sets get the
//! same equivalence label and are merged in the node factory, and the
//! constraint set is rewritten into a smaller, semantically equivalent
//! one.
//!
//! The pass works on a predecessor graph over a tripled index space. For
//! a node `n` (with `N` the frozen node count), `n + N` is the REF shadow
//! standing for `*n` and `n + 2N` the ADR shadow standing for `&n`. The
//! shadows are virtual: they index the predecessor graph and the label
//! array only, never the factory, and are discarded when the pass ends.
//! The factory must not grow while the pass runs.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::constraint::{uniquify, Constraint, ConstraintKind};
use crate::graph::SparseBitVectorGraph;
use crate::node::NodeFactory;
use crate::scc::{CycleDetector, SccGraph};
use crate::types::NodeIndex;

const UNLABELED: u32 = u32::MAX;

fn resolve(merge: &[u32], mut x: u32) -> u32 {
    loop {
        let target = merge[x as usize];
        if target == x {
            return x;
        }
        x = target;
    }
}

/// Pointer-equivalence label of a real node, after both the factory's
/// merges and the pass-local shadow merges. Label 0 means "not a
/// pointer".
fn node_label(labels: &[u32], merge: &[u32], factory: &NodeFactory, x: NodeIndex) -> u32 {
    let rep = factory.rep(x).raw();
    let label = labels[resolve(merge, rep) as usize];
    if label == UNLABELED {
        0
    } else {
        label
    }
}

/// SCC driver over the predecessor graph: condenses cycles and assigns
/// equivalence labels in post-order.
struct HvnDriver<'a> {
    pred: &'a mut SparseBitVectorGraph,
    roots: Vec<u32>,
    num_nodes: u32,
    /// Pass-local union-find over the tripled index space.
    merge: Vec<u32>,
    /// Nodes whose points-to set is seeded directly (addr-of sources) or
    /// otherwise not derivable from predecessors alone.
    indirect: FxHashSet<u32>,
    labels: Vec<u32>,
    next_label: u32,
    /// Hash-consing of predecessor label sets, keyed by the sorted label
    /// list.
    label_cache: FxHashMap<Vec<u32>, u32>,
}

impl HvnDriver<'_> {
    fn fresh_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }
}

impl SccGraph for HvnDriver<'_> {
    fn nodes(&self) -> Vec<u32> {
        self.roots.clone()
    }

    fn rep(&mut self, node: u32) -> u32 {
        resolve(&self.merge, node)
    }

    fn children(&self, node: u32) -> Vec<u32> {
        self.pred
            .succs(node)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }

    fn on_cycle_member(&mut self, member: u32, rep: u32) {
        self.merge[member as usize] = rep;
        self.pred.merge_edges(rep, member);
        // Indirect-ness propagates to the representative; a shadow member
        // taints the whole component
        if member >= self.num_nodes || self.indirect.contains(&member) {
            self.indirect.insert(rep);
        }
    }

    fn on_cycle_rep(&mut self, rep: u32) {
        let label = if rep >= self.num_nodes || self.indirect.contains(&rep) {
            self.fresh_label()
        } else {
            let mut pred_labels = Vec::new();
            if let Some(preds) = self.pred.succs(rep) {
                for p in preds.iter() {
                    let p = resolve(&self.merge, p);
                    if p == rep {
                        continue;
                    }
                    let l = self.labels[p as usize];
                    if l != 0 && l != UNLABELED {
                        pred_labels.push(l);
                    }
                }
            }
            pred_labels.sort_unstable();
            pred_labels.dedup();
            match pred_labels.len() {
                0 => 0,
                1 => pred_labels[0],
                _ => match self.label_cache.get(&pred_labels) {
                    Some(&l) => l,
                    None => {
                        let l = self.fresh_label();
                        self.label_cache.insert(pred_labels, l);
                        l
                    }
                },
            }
        };
        self.labels[rep as usize] = label;
    }
}

pub struct HvnOptimizer<'a> {
    factory: &'a mut NodeFactory,
    constraints: &'a mut Vec<Constraint>,
}

impl<'a> HvnOptimizer<'a> {
    pub fn new(factory: &'a mut NodeFactory, constraints: &'a mut Vec<Constraint>) -> Self {
        Self {
            factory,
            constraints,
        }
    }

    pub fn run(&mut self) {
        let num = self.factory.num_nodes() as u32;
        let before = self.constraints.len();

        let (labels, merge) = self.label_nodes(num);
        self.merge_equivalent_nodes(num, &labels, &merge);
        self.rewrite_constraints(num, &labels, &merge);

        debug!(
            "hvn: {} constraints in, {} constraints out",
            before,
            self.constraints.len()
        );
    }

    /// Builds the predecessor graph and runs the labeling SCC pass.
    fn label_nodes(&mut self, num: u32) -> (Vec<u32>, Vec<u32>) {
        let mut pred = SparseBitVectorGraph::new();
        let mut indirect = FxHashSet::default();

        // Edges point from consumer to producer. The `REF(d) <- s` edge
        // of addr-of is the implicit one that exposes cycles through
        // dereferences of address-taken variables.
        for c in self.constraints.iter() {
            let s = self.factory.rep(c.src).raw();
            let d = self.factory.rep(c.dest).raw();
            match c.kind {
                ConstraintKind::AddrOf => {
                    indirect.insert(s);
                    pred.insert_edge(d, s + 2 * num);
                    pred.insert_edge(d + num, s);
                }
                ConstraintKind::Copy => {
                    pred.insert_edge(d, s);
                    pred.insert_edge(d + num, s + num);
                }
                ConstraintKind::Load => {
                    pred.insert_edge(d, s + num);
                }
                ConstraintKind::Store => {
                    pred.insert_edge(d + num, s);
                }
            }
        }

        let mut roots: Vec<u32> = (0..num)
            .map(|i| self.factory.rep(NodeIndex::new(i)).raw())
            .collect();
        roots.extend(pred.nodes());

        let mut driver = HvnDriver {
            pred: &mut pred,
            roots,
            num_nodes: num,
            merge: (0..3 * num).collect(),
            indirect,
            labels: vec![UNLABELED; (3 * num) as usize],
            next_label: 1,
            label_cache: FxHashMap::default(),
        };
        CycleDetector::new().run_over_graph(&mut driver);

        let HvnDriver { labels, merge, .. } = driver;
        (labels, merge)
    }

    /// Merges value nodes that share a non-zero equivalence label.
    fn merge_equivalent_nodes(&mut self, num: u32, labels: &[u32], merge: &[u32]) {
        let mut label_group: FxHashMap<u32, NodeIndex> = FxHashMap::default();
        for i in 0..num {
            let n = NodeIndex::new(i);
            if !self.factory.is_value_node(n) {
                continue;
            }
            let label = node_label(labels, merge, self.factory, n);
            if label == 0 {
                continue;
            }
            match label_group.get(&label) {
                Some(&first) => {
                    let keep = self.factory.find_rep(first);
                    let drop = self.factory.find_rep(n);
                    if keep != drop && !NodeFactory::is_reserved(drop) {
                        debug!("hvn: {} is pointer-equivalent to {}", drop, keep);
                        self.factory.merge(keep, drop);
                    }
                }
                None => {
                    label_group.insert(label, n);
                }
            }
        }
    }

    /// Rewrites the constraint set under the new labels and merges.
    fn rewrite_constraints(&mut self, num: u32, labels: &[u32], merge: &[u32]) {
        // An ADR shadow's label is unique, so a node carrying the same
        // label is known to be exactly the address of the underlying
        // variable: loads through it become copies, copies of it become
        // addr-of, stores through it become copies into it.
        let mut adr_owner: FxHashMap<u32, NodeIndex> = FxHashMap::default();
        for i in 0..num {
            let shadow = resolve(merge, 2 * num + i);
            let label = labels[shadow as usize];
            if label != UNLABELED && label != 0 {
                adr_owner.entry(label).or_insert(NodeIndex::new(i));
            }
        }

        let old = std::mem::take(self.constraints);
        let mut rewritten = Vec::with_capacity(old.len());
        for c in old {
            let d = self.factory.find_rep(c.dest);
            let s = self.factory.find_rep(c.src);
            let dest_label = node_label(labels, merge, self.factory, d);
            if dest_label == 0 {
                debug!("hvn: dropping '{}', destination is not a pointer", c);
                continue;
            }
            match c.kind {
                ConstraintKind::AddrOf => {
                    // Object identity is by original index
                    rewritten.push(Constraint::addr_of(d, c.src));
                }
                ConstraintKind::Copy => {
                    let src_label = node_label(labels, merge, self.factory, s);
                    if let Some(&var) = adr_owner.get(&src_label) {
                        debug!("hvn: '{}' strength-reduced to addr_of", c);
                        rewritten.push(Constraint::addr_of(d, var));
                    } else if d != s {
                        rewritten.push(Constraint::copy(d, s));
                    }
                }
                ConstraintKind::Load => {
                    let src_label = node_label(labels, merge, self.factory, s);
                    if let Some(&var) = adr_owner.get(&src_label) {
                        let var = self.factory.find_rep(var);
                        debug!("hvn: '{}' strength-reduced to copy", c);
                        if d != var {
                            rewritten.push(Constraint::copy(d, var));
                        }
                    } else {
                        rewritten.push(Constraint::load(d, s));
                    }
                }
                ConstraintKind::Store => {
                    if let Some(&var) = adr_owner.get(&dest_label) {
                        let var = self.factory.find_rep(var);
                        debug!("hvn: '{}' strength-reduced to copy", c);
                        if var != s {
                            rewritten.push(Constraint::copy(var, s));
                        }
                    } else {
                        rewritten.push(Constraint::store(d, s));
                    }
                }
            }
        }
        uniquify(&mut rewritten);
        *self.constraints = rewritten;
    }
}
