//! The analysis manager and client query surface.
//!
//! [`Andersen`] owns every piece of analysis state: the node factory, the
//! collected constraints, and the solved points-to index. Run it once
//! over a module, then query it from as many (read-only) places as you
//! like.
//!
//! # Basic Usage
//!
//! ```rust
//! use anders_rs::andersen::Andersen;
//! use anders_rs::ir::{Init, Module, Operand, Statement};
//!
//! let mut module = Module::new();
//! let g = module.add_global(Init::Null, false);
//! let f = module.add_function("main");
//! let p = module.fresh_value();
//! module.function_mut(f).body = vec![
//!     Statement::Alloca { dst: p },
//!     Statement::Store { addr: p, value: Operand::Value(g) },
//! ];
//!
//! let mut anders = Andersen::default();
//! anders.run(&module);
//! assert_eq!(anders.points_to(p), Some(vec![p]));
//! ```

use log::debug;
use rustc_hash::FxHashMap;

use crate::collect::{Collector, ObjectOrigin};
use crate::constraint::Constraint;
use crate::hvn::HvnOptimizer;
use crate::ir::{Module, ValueRef};
use crate::node::NodeFactory;
use crate::ptsset::{PointsToIndex, PtsSet};
use crate::solver;
use crate::types::NodeIndex;

/// Tuning knobs. The three optimizations are all on by default and exist
/// as knobs for debugging and for measuring their individual payoff.
#[derive(Debug, Copy, Clone)]
pub struct AnalysisConfig {
    /// Offline constraint optimization (variable substitution).
    pub enable_hvn: bool,
    /// Hybrid (offline-assisted) cycle detection.
    pub enable_hcd: bool,
    /// Lazy (online-heuristic) cycle detection.
    pub enable_lcd: bool,
    /// Print the constraint listing after collection, one per line.
    pub dump_constraints: bool,
    /// Print the solved points-to sets, one node per line.
    pub dump_result: bool,
    /// Log node factory contents after solving.
    pub dump_debug: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enable_hvn: true,
            enable_hcd: true,
            enable_lcd: true,
            dump_constraints: false,
            dump_result: false,
            dump_debug: false,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AliasResult {
    No,
    May,
    Must,
}

pub struct Andersen {
    config: AnalysisConfig,
    factory: NodeFactory,
    constraints: Vec<Constraint>,
    pts: PointsToIndex,
    origins: FxHashMap<ValueRef, ObjectOrigin>,
}

impl Andersen {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            factory: NodeFactory::new(),
            constraints: Vec::new(),
            pts: PointsToIndex::new(),
            origins: FxHashMap::default(),
        }
    }

    /// Runs the whole pipeline: collection, offline optimization, and the
    /// fixed-point solve.
    pub fn run(&mut self, module: &Module) {
        Collector::new(
            module,
            &mut self.factory,
            &mut self.constraints,
            &mut self.origins,
        )
        .run();

        if self.config.dump_constraints {
            self.dump_constraints();
        }

        if self.config.enable_hvn {
            HvnOptimizer::new(&mut self.factory, &mut self.constraints).run();
        }

        debug!("solving {} constraints", self.constraints.len());
        solver::solve(
            &mut self.factory,
            &self.constraints,
            &mut self.pts,
            self.config.enable_hcd,
            self.config.enable_lcd,
        );

        if self.config.dump_result {
            self.dump_result();
        }
        if self.config.dump_debug {
            self.factory.dump();
        }
    }

    pub fn factory(&self) -> &NodeFactory {
        &self.factory
    }

    pub fn points_to_index(&self) -> &PointsToIndex {
        &self.pts
    }

    /// The objects `v` may point to, as IR references. `None` means the
    /// question is unanswerable: `v` has no node, or it is the universal
    /// pointer. Objects without an IR identity (the universal object,
    /// scratch temporaries) and the null object are skipped.
    pub fn points_to(&self, v: ValueRef) -> Option<Vec<ValueRef>> {
        let node = self.factory.value_node_for(v)?;
        if node == NodeFactory::UNIVERSAL_PTR {
            return None;
        }
        let rep = self.factory.rep(node);
        let set = self.pts.get(rep)?;
        let mut out = Vec::new();
        for idx in set.iter() {
            if idx == NodeFactory::NULL_OBJ {
                continue;
            }
            if let Some(r) = self.factory.value_of(idx) {
                out.push(r);
            }
        }
        Some(out)
    }

    /// May/must alias query on two pointer values.
    pub fn alias(&self, v1: ValueRef, v2: ValueRef) -> AliasResult {
        let (Some(n1), Some(n2)) = (
            self.factory.value_node_for(v1),
            self.factory.value_node_for(v2),
        ) else {
            return AliasResult::May;
        };
        let r1 = self.factory.rep(n1);
        let r2 = self.factory.rep(n2);
        if r1 == r2 {
            return AliasResult::Must;
        }

        let (Some(s1), Some(s2)) = (self.pts.get(r1), self.pts.get(r2)) else {
            // We know nothing about at least one of them
            return AliasResult::May;
        };

        let null_only =
            |s: &PtsSet| s.len() == 1 && s.has(NodeFactory::NULL_OBJ);
        if null_only(s1) || null_only(s2) {
            return AliasResult::No;
        }

        if s1.len() == 1 && s2.len() == 1 && s1.iter().next() == s2.iter().next() {
            return AliasResult::Must;
        }

        // Intersect, ignoring the null object
        for idx in s1.iter() {
            if idx == NodeFactory::NULL_OBJ {
                continue;
            }
            if s2.has(idx) {
                return AliasResult::May;
            }
        }
        AliasResult::No
    }

    /// True if everything `v` may point to is immutable memory. With
    /// `include_locals`, stack and heap objects pass as well.
    pub fn points_to_constant_memory(&self, v: ValueRef, include_locals: bool) -> bool {
        let Some(node) = self.factory.value_node_for(v) else {
            return false;
        };
        let rep = self.factory.rep(node);
        let Some(set) = self.pts.get(rep) else {
            return false;
        };
        for idx in set.iter() {
            if idx == NodeFactory::NULL_OBJ {
                continue;
            }
            let Some(r) = self.factory.value_of(idx) else {
                // The universal object or a scratch temporary
                return false;
            };
            match self.origins.get(&r) {
                Some(ObjectOrigin::Global { is_const }) => {
                    if !is_const {
                        return false;
                    }
                }
                Some(ObjectOrigin::Function) => {}
                Some(ObjectOrigin::Stack) | Some(ObjectOrigin::Heap) => {
                    if !include_locals {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    /// Every IR value that owns a memory object.
    pub fn all_allocation_sites(&self) -> Vec<ValueRef> {
        self.factory.allocation_sites()
    }

    /// Line-oriented constraint listing: `kind dst src`.
    pub fn dump_constraints(&self) {
        for c in &self.constraints {
            println!("{}", c);
        }
    }

    /// Line-oriented points-to adjacency: `node target_1 target_2 ...`.
    pub fn dump_result(&self) {
        let mut entries: Vec<(NodeIndex, &PtsSet)> = self.pts.iter().collect();
        entries.sort_by_key(|&(n, _)| n);
        for (n, set) in entries {
            if set.is_empty() {
                continue;
            }
            print!("{}", n);
            for target in set.iter() {
                print!(" {}", target);
            }
            println!();
        }
    }
}

impl Default for Andersen {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Callee, Init, Operand, Statement};

    #[test]
    fn test_end_to_end_stack_flow() {
        // p = alloca; q = alloca; *p = q; r = *p
        let mut module = Module::new();
        let f = module.add_function("main");
        let p = module.fresh_value();
        let q = module.fresh_value();
        let r = module.fresh_value();
        module.function_mut(f).body = vec![
            Statement::Alloca { dst: p },
            Statement::Alloca { dst: q },
            Statement::Store {
                addr: p,
                value: Operand::Value(q),
            },
            Statement::Load { dst: r, addr: p },
        ];

        let mut anders = Andersen::default();
        anders.run(&module);

        assert_eq!(anders.points_to(p), Some(vec![p]));
        assert_eq!(anders.points_to(r), Some(vec![q]));
        assert_eq!(anders.alias(r, q), AliasResult::Must);
    }

    #[test]
    fn test_null_guard_never_aliases() {
        let mut module = Module::new();
        let f = module.add_function("main");
        let p = module.fresh_value();
        let q = module.fresh_value();
        module.function_mut(f).body = vec![
            Statement::Assign {
                dst: p,
                srcs: vec![Operand::Null],
            },
            Statement::Alloca { dst: q },
        ];

        let mut anders = Andersen::default();
        anders.run(&module);
        assert_eq!(anders.alias(p, q), AliasResult::No);
    }

    #[test]
    fn test_constant_memory() {
        let mut module = Module::new();
        let ro = module.add_global(Init::Scalar, true);
        let rw = module.add_global(Init::Scalar, false);
        let f = module.add_function("main");
        let p = module.fresh_value();
        let q = module.fresh_value();
        module.function_mut(f).body = vec![
            Statement::Assign {
                dst: p,
                srcs: vec![Operand::Value(ro)],
            },
            Statement::Assign {
                dst: q,
                srcs: vec![Operand::Value(rw)],
            },
        ];

        let mut anders = Andersen::default();
        anders.run(&module);
        assert!(anders.points_to_constant_memory(p, false));
        assert!(!anders.points_to_constant_memory(q, false));
    }

    #[test]
    fn test_unknown_external_reports_unanswerable_or_universal() {
        let mut module = Module::new();
        let mystery = module.add_function("mystery_fn");
        {
            let m = module.function_mut(mystery);
            m.is_external = true;
            m.returns_pointer = true;
        }
        let f = module.add_function("main");
        let p = module.fresh_value();
        module.function_mut(f).body = vec![Statement::Call {
            dst: Some(p),
            callee: Callee::Direct(mystery),
            args: vec![],
        }];

        let mut anders = Andersen::default();
        anders.run(&module);
        // p flowed through the universal pointer: nothing nameable
        let targets = anders.points_to(p);
        assert!(targets.is_none() || targets == Some(vec![]));
        assert!(!anders.points_to_constant_memory(p, true));
    }

    #[test]
    fn test_allocation_sites() {
        let mut module = Module::new();
        let g = module.add_global(Init::Scalar, false);
        let f = module.add_function("main");
        let p = module.fresh_value();
        module.function_mut(f).body = vec![Statement::Alloca { dst: p }];

        let mut anders = Andersen::default();
        anders.run(&module);
        let sites = anders.all_allocation_sites();
        assert!(sites.contains(&g));
        assert!(sites.contains(&p));
    }
}
