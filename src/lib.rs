//! # anders-rs: Andersen-style points-to analysis in Rust
//!
//! **`anders-rs`** is an inclusion-based, flow- and context-insensitive
//! points-to analysis for a lowered pointer IR. Given a module whose
//! pointer-manipulating operations have been reduced to a small set of
//! abstract statements, it computes, for every pointer-valued variable, a
//! sound over-approximation of the abstract memory objects it may point
//! to, and answers alias queries on top of that.
//!
//! ## How it works
//!
//! Statements become subset constraints (`addr_of`, `copy`, `load`,
//! `store`) between points-to sets, and the solver drives them to a least
//! fixed point. Three classic optimizations keep that tractable:
//!
//! - **HVN** offline variable substitution merges pointer-equivalent
//!   variables before solving ([`hvn`]).
//! - **HCD** hybrid cycle detection turns offline SCCs into online
//!   collapse directives ([`solver`]).
//! - **LCD** lazy cycle detection collapses copy cycles discovered
//!   heuristically while solving ([`solver`]).
//!
//! ## Key Design Points
//!
//! - **Manager-centric**: all state hangs off one [`Andersen`] value;
//!   dropping it drops the whole analysis.
//! - **No pointer graphs**: nodes are dense `u32` indices into a factory
//!   vector; merges rewrite a union-find target instead of moving data.
//! - **Sparse sets everywhere**: points-to sets and edge sets cost time
//!   proportional to their population, not to the node count.
//!
//! ## Basic Usage
//!
//! ```rust
//! use anders_rs::{AliasResult, Andersen};
//! use anders_rs::ir::{Module, Operand, Statement};
//!
//! let mut module = Module::new();
//! let f = module.add_function("main");
//! let p = module.fresh_value();
//! let q = module.fresh_value();
//! module.function_mut(f).body = vec![
//!     Statement::Alloca { dst: p },
//!     Statement::Assign { dst: q, srcs: vec![Operand::Value(p)] },
//! ];
//!
//! let mut anders = Andersen::default();
//! anders.run(&module);
//! assert_eq!(anders.alias(p, q), AliasResult::Must);
//! ```

pub mod andersen;
pub mod bitset;
pub mod collect;
pub mod congraph;
pub mod constraint;
pub mod extlib;
pub mod graph;
pub mod hvn;
pub mod ir;
pub mod node;
pub mod ptsset;
pub mod scc;
pub mod solver;
pub mod types;

pub use andersen::{AliasResult, AnalysisConfig, Andersen};
