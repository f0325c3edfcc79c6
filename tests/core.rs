//! Core tests for the points-to analysis.
//!
//! Covers the constraint-level solver scenarios, the solution closure
//! invariants, boundary cases, and end-to-end runs through the IR
//! frontend with different optimization configurations.

use anders_rs::andersen::{AliasResult, AnalysisConfig, Andersen};
use anders_rs::constraint::{Constraint, ConstraintKind};
use anders_rs::ir::{Callee, Init, Module, Operand, Param, Statement, ValueRef};
use anders_rs::node::NodeFactory;
use anders_rs::ptsset::{PointsToIndex, PtsSet};
use anders_rs::solver;
use anders_rs::types::NodeIndex;

fn n(raw: u32) -> NodeIndex {
    NodeIndex::new(raw)
}

/// Factory with the three standing constraints every module starts with.
fn seeded() -> (NodeFactory, Vec<Constraint>) {
    let factory = NodeFactory::new();
    let constraints = vec![
        Constraint::addr_of(NodeFactory::UNIVERSAL_PTR, NodeFactory::UNIVERSAL_OBJ),
        Constraint::store(NodeFactory::UNIVERSAL_OBJ, NodeFactory::UNIVERSAL_OBJ),
        Constraint::addr_of(NodeFactory::NULL_PTR, NodeFactory::NULL_OBJ),
    ];
    (factory, constraints)
}

fn solve(factory: &mut NodeFactory, constraints: &[Constraint]) -> PointsToIndex {
    let mut pts = PointsToIndex::new();
    solver::solve(factory, constraints, &mut pts, true, true);
    pts
}

fn set_of(factory: &NodeFactory, pts: &PointsToIndex, node: NodeIndex) -> Vec<NodeIndex> {
    pts.get(factory.rep(node))
        .map(|s| s.iter().collect())
        .unwrap_or_default()
}

/// Checks the four closure invariants of the solved mapping. Sets that
/// absorbed the universal object trivially satisfy any inclusion.
fn check_closure(factory: &mut NodeFactory, constraints: &[Constraint], pts: &PointsToIndex) {
    let lookup = |factory: &mut NodeFactory, node: NodeIndex| -> PtsSet {
        let rep = factory.find_rep(node);
        pts.get(rep).cloned().unwrap_or_default()
    };
    for c in constraints {
        let dest_set = lookup(factory, c.dest);
        if dest_set.has(NodeFactory::UNIVERSAL_OBJ) {
            continue;
        }
        match c.kind {
            ConstraintKind::AddrOf => {
                assert!(dest_set.has(c.src), "closure under addr-of broken by {}", c);
            }
            ConstraintKind::Copy => {
                let src_set = lookup(factory, c.src);
                assert!(
                    dest_set.contains(&src_set),
                    "closure under copy broken by {}",
                    c
                );
            }
            ConstraintKind::Load => {
                let src_set = lookup(factory, c.src);
                for o in src_set.iter() {
                    let obj_set = lookup(factory, o);
                    assert!(
                        dest_set.contains(&obj_set),
                        "closure under load broken by {} at {}",
                        c,
                        o
                    );
                }
            }
            ConstraintKind::Store => {
                let src_set = lookup(factory, c.src);
                for o in dest_set.iter() {
                    let obj_set = lookup(factory, o);
                    if obj_set.has(NodeFactory::UNIVERSAL_OBJ) {
                        continue;
                    }
                    assert!(
                        obj_set.contains(&src_set),
                        "closure under store broken by {} at {}",
                        c,
                        o
                    );
                }
            }
        }
    }
}

// ─── Constraint-Level Scenarios ────────────────────────────────────────────────

#[test]
fn scenario_addr_of_then_copy() {
    // S1: ADDR_OF(4, 5), COPY(6, 4)
    let (mut factory, mut cs) = seeded();
    let a = factory.create_value_node(None); // n4
    let x = factory.create_object_node(None); // n5
    let b = factory.create_value_node(None); // n6
    cs.push(Constraint::addr_of(a, x));
    cs.push(Constraint::copy(b, a));

    let pts = solve(&mut factory, &cs);
    assert_eq!(set_of(&factory, &pts, n(4)), vec![n(5)]);
    assert_eq!(set_of(&factory, &pts, n(6)), vec![n(5)]);
    check_closure(&mut factory, &cs, &pts);
}

#[test]
fn scenario_store_then_load() {
    // S2: ADDR_OF(4, 5), STORE(4, 6), ADDR_OF(6, 7), LOAD(8, 4)
    let (mut factory, mut cs) = seeded();
    let p = factory.create_value_node(None); // n4
    let _x = factory.create_object_node(None); // n5
    let q = factory.create_value_node(None); // n6
    let _y = factory.create_object_node(None); // n7
    let r = factory.create_value_node(None); // n8
    cs.push(Constraint::addr_of(p, n(5)));
    cs.push(Constraint::store(p, q));
    cs.push(Constraint::addr_of(q, n(7)));
    cs.push(Constraint::load(r, p));

    let pts = solve(&mut factory, &cs);
    assert_eq!(set_of(&factory, &pts, n(4)), vec![n(5)]);
    assert_eq!(set_of(&factory, &pts, n(5)), vec![n(7)]);
    assert_eq!(set_of(&factory, &pts, n(6)), vec![n(7)]);
    assert_eq!(set_of(&factory, &pts, n(8)), vec![n(7)]);
    check_closure(&mut factory, &cs, &pts);
}

#[test]
fn scenario_merge_of_two_sources() {
    // S3: ADDR_OF(4, 5), ADDR_OF(6, 7), COPY(8, 4), COPY(8, 6)
    let (mut factory, mut cs) = seeded();
    let a = factory.create_value_node(None); // n4
    let _x = factory.create_object_node(None); // n5
    let b = factory.create_value_node(None); // n6
    let _y = factory.create_object_node(None); // n7
    let c = factory.create_value_node(None); // n8
    cs.push(Constraint::addr_of(a, n(5)));
    cs.push(Constraint::addr_of(b, n(7)));
    cs.push(Constraint::copy(c, a));
    cs.push(Constraint::copy(c, b));

    let pts = solve(&mut factory, &cs);
    assert_eq!(set_of(&factory, &pts, n(8)), vec![n(5), n(7)]);
    check_closure(&mut factory, &cs, &pts);
}

#[test]
fn scenario_copy_cycle_collapses() {
    // S4: COPY(4, 5), COPY(5, 6), COPY(6, 4), ADDR_OF(4, 7)
    let (mut factory, mut cs) = seeded();
    let a = factory.create_value_node(None); // n4
    let b = factory.create_value_node(None); // n5
    let c = factory.create_value_node(None); // n6
    let _o = factory.create_object_node(None); // n7
    cs.push(Constraint::copy(a, b));
    cs.push(Constraint::copy(b, c));
    cs.push(Constraint::copy(c, a));
    cs.push(Constraint::addr_of(a, n(7)));

    let pts = solve(&mut factory, &cs);
    let rep = factory.find_rep(a);
    assert_eq!(factory.find_rep(b), rep);
    assert_eq!(factory.find_rep(c), rep);
    assert_eq!(set_of(&factory, &pts, rep), vec![n(7)]);
    check_closure(&mut factory, &cs, &pts);
}

#[test]
fn scenario_universal_store_absorbs() {
    // S5: STORE(4, UNIVERSAL_OBJ), ADDR_OF(4, 5), LOAD(6, 4)
    let (mut factory, mut cs) = seeded();
    let p = factory.create_value_node(None); // n4
    let _x = factory.create_object_node(None); // n5
    let r = factory.create_value_node(None); // n6
    cs.push(Constraint::store(p, NodeFactory::UNIVERSAL_OBJ));
    cs.push(Constraint::addr_of(p, n(5)));
    cs.push(Constraint::load(r, p));

    let pts = solve(&mut factory, &cs);
    let r_set = pts.get(factory.rep(r)).unwrap();
    assert!(r_set.has(NodeFactory::UNIVERSAL_OBJ));
    assert_eq!(r_set.len(), 1);
}

#[test]
fn scenario_null_guard() {
    // S6: ADDR_OF(4, NULL_OBJ), ADDR_OF(6, 9): the sets cannot overlap
    let (mut factory, mut cs) = seeded();
    let p = factory.create_value_node(None); // n4
    let _a = factory.create_object_node(None); // n5
    let q = factory.create_value_node(None); // n6
    let _b = factory.create_object_node(None); // n7
    let _c = factory.create_object_node(None); // n8
    let _d = factory.create_object_node(None); // n9
    cs.push(Constraint::addr_of(p, NodeFactory::NULL_OBJ));
    cs.push(Constraint::addr_of(q, n(9)));

    let pts = solve(&mut factory, &cs);
    assert_ne!(factory.rep(p), factory.rep(q));
    let p_set = pts.get(factory.rep(p)).unwrap();
    let q_set = pts.get(factory.rep(q)).unwrap();
    // p holds only null, so the alias ladder answers NO
    assert_eq!(p_set.iter().collect::<Vec<_>>(), vec![NodeFactory::NULL_OBJ]);
    assert!(!q_set.has(NodeFactory::NULL_OBJ));
    assert!(!p_set.intersects(q_set));
}

// ─── Universal-Object Absorption ───────────────────────────────────────────────

#[test]
fn universal_object_is_size_one_absorbing() {
    let (mut factory, mut cs) = seeded();
    let a = factory.create_value_node(None); // n4
    let x = factory.create_object_node(None); // n5
    cs.push(Constraint::addr_of(a, x));
    cs.push(Constraint::copy(a, NodeFactory::UNIVERSAL_PTR));

    let pts = solve(&mut factory, &cs);
    for (_, set) in pts.iter() {
        if set.has(NodeFactory::UNIVERSAL_OBJ) {
            assert_eq!(set.len(), 1, "universal-object set not truncated");
        }
    }
    let a_set = pts.get(factory.rep(a)).unwrap();
    assert!(a_set.has(NodeFactory::UNIVERSAL_OBJ));
}

// ─── Boundary Cases ────────────────────────────────────────────────────────────

#[test]
fn reserved_nodes_only() {
    let (mut factory, cs) = seeded();
    let pts = solve(&mut factory, &cs);
    assert_eq!(
        set_of(&factory, &pts, NodeFactory::UNIVERSAL_PTR),
        vec![NodeFactory::UNIVERSAL_OBJ]
    );
    assert_eq!(
        set_of(&factory, &pts, NodeFactory::NULL_PTR),
        vec![NodeFactory::NULL_OBJ]
    );
    check_closure(&mut factory, &cs, &pts);
}

#[test]
fn only_self_copies() {
    let (mut factory, mut cs) = seeded();
    for _ in 0..8 {
        let v = factory.create_value_node(None);
        cs.push(Constraint::copy(v, v));
    }
    let pts = solve(&mut factory, &cs);
    for i in 4..12 {
        assert!(set_of(&factory, &pts, n(i)).is_empty());
    }
}

#[test]
fn pointer_known_only_through_universal() {
    let (mut factory, mut cs) = seeded();
    let v = factory.create_value_node(None);
    cs.push(Constraint::copy(v, NodeFactory::UNIVERSAL_PTR));

    let pts = solve(&mut factory, &cs);
    assert_eq!(
        set_of(&factory, &pts, v),
        vec![NodeFactory::UNIVERSAL_OBJ]
    );
}

#[test]
fn self_referential_store_reaches_fixpoint() {
    let (mut factory, mut cs) = seeded();
    let a = factory.create_value_node(None); // n4
    let o = factory.create_object_node(None); // n5
    cs.push(Constraint::store(a, a));
    cs.push(Constraint::addr_of(a, o));

    let pts = solve(&mut factory, &cs);
    assert!(pts.get(factory.rep(a)).unwrap().has(o));
    check_closure(&mut factory, &cs, &pts);
}

#[test]
fn empty_module_runs() {
    let module = Module::new();
    let mut anders = Andersen::default();
    anders.run(&module);
    assert!(anders.points_to(ValueRef::new(0)).is_none());
}

// ─── Re-Solving Is Idempotent ──────────────────────────────────────────────────

#[test]
fn resolving_solved_state_changes_nothing() {
    let (mut factory, mut cs) = seeded();
    let p = factory.create_value_node(None);
    let x = factory.create_object_node(None);
    let q = factory.create_value_node(None);
    let y = factory.create_object_node(None);
    let r = factory.create_value_node(None);
    cs.push(Constraint::addr_of(p, x));
    cs.push(Constraint::store(p, q));
    cs.push(Constraint::addr_of(q, y));
    cs.push(Constraint::load(r, p));

    let mut pts = PointsToIndex::new();
    solver::solve(&mut factory, &cs, &mut pts, true, true);
    let snapshot = |factory: &NodeFactory, pts: &PointsToIndex| {
        let mut all: Vec<(NodeIndex, Vec<NodeIndex>)> = pts
            .iter()
            .map(|(node, s)| (node, s.iter().collect()))
            .collect();
        all.sort();
        let mut reps: Vec<NodeIndex> = (0..factory.num_nodes() as u32)
            .map(|i| factory.rep(n(i)))
            .collect();
        reps.dedup();
        (all, reps)
    };
    let first = snapshot(&factory, &pts);
    solver::solve(&mut factory, &cs, &mut pts, true, true);
    let second = snapshot(&factory, &pts);
    assert_eq!(first, second);
}

// ─── End-To-End Through The Frontend ───────────────────────────────────────────

/// A module with globals, calls, an indirect call, and heap allocation.
fn interesting_module() -> (Module, Vec<ValueRef>) {
    let mut module = Module::new();

    let buf = module.add_global(Init::Scalar, false);
    let table = module.add_global(Init::Global(buf), false);

    let malloc = module.add_function("malloc");
    {
        let f = module.function_mut(malloc);
        f.is_external = true;
        f.returns_pointer = true;
    }

    let id = module.add_function("id");
    let id_param = module.fresh_value();
    {
        let f = module.function_mut(id);
        f.is_address_taken = true;
        f.returns_pointer = true;
        f.params.push(Param {
            value: id_param,
            is_pointer: true,
        });
        f.body.push(Statement::Return {
            value: Operand::Value(id_param),
        });
    }
    let id_value = module.function(id).value;

    let main = module.add_function("main");
    let sp = module.fresh_value();
    let hp = module.fresh_value();
    let loaded = module.fresh_value();
    let forwarded = module.fresh_value();
    let fp = module.fresh_value();
    let ind = module.fresh_value();
    module.function_mut(main).body = vec![
        Statement::Alloca { dst: sp },
        Statement::Call {
            dst: Some(hp),
            callee: Callee::Direct(malloc),
            args: vec![Operand::NonPointer],
        },
        Statement::Load {
            dst: loaded,
            addr: table,
        },
        Statement::Call {
            dst: Some(forwarded),
            callee: Callee::Direct(id),
            args: vec![Operand::Value(sp)],
        },
        Statement::Assign {
            dst: fp,
            srcs: vec![Operand::Value(id_value)],
        },
        Statement::Call {
            dst: Some(ind),
            callee: Callee::Indirect(fp),
            args: vec![Operand::Value(hp)],
        },
        Statement::Store {
            addr: sp,
            value: Operand::Value(hp),
        },
    ];

    let probes = vec![buf, table, id_param, sp, hp, loaded, forwarded, fp, ind];
    (module, probes)
}

#[test]
fn end_to_end_queries() {
    let (module, _) = interesting_module();
    let mut anders = Andersen::default();
    anders.run(&module);

    let sp = module.function(module.functions[2].func).body[0].clone();
    let Statement::Alloca { dst: sp } = sp else {
        unreachable!()
    };
    // forwarded came back out of id(sp)
    let Statement::Call {
        dst: Some(forwarded),
        ..
    } = module.functions[2].body[3].clone()
    else {
        unreachable!()
    };
    assert_eq!(anders.alias(forwarded, sp), AliasResult::May);
    assert_eq!(anders.points_to(sp), Some(vec![sp]));
}

#[test]
fn optimization_equivalence() {
    let (module, probes) = interesting_module();

    let configs = [
        AnalysisConfig::default(),
        AnalysisConfig {
            enable_hvn: false,
            ..AnalysisConfig::default()
        },
        AnalysisConfig {
            enable_hvn: false,
            enable_hcd: false,
            enable_lcd: false,
            ..AnalysisConfig::default()
        },
        AnalysisConfig {
            enable_hcd: false,
            ..AnalysisConfig::default()
        },
    ];

    let mut solutions = Vec::new();
    for config in configs {
        let mut anders = Andersen::new(config);
        anders.run(&module);
        let solution: Vec<Option<Vec<ValueRef>>> = probes
            .iter()
            .map(|&v| {
                anders.points_to(v).map(|mut targets| {
                    targets.sort();
                    targets
                })
            })
            .collect();
        solutions.push(solution);
    }

    for other in &solutions[1..] {
        assert_eq!(&solutions[0], other, "optimizations changed the solution");
    }
}
