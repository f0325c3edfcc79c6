//! Solver benchmarks over synthetic constraint workloads.
//!
//! Run with:
//! ```bash
//! cargo bench --bench solver
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use anders_rs::constraint::Constraint;
use anders_rs::hvn::HvnOptimizer;
use anders_rs::node::NodeFactory;
use anders_rs::ptsset::PointsToIndex;
use anders_rs::solver;

fn seeds() -> Vec<Constraint> {
    vec![
        Constraint::addr_of(NodeFactory::UNIVERSAL_PTR, NodeFactory::UNIVERSAL_OBJ),
        Constraint::store(NodeFactory::UNIVERSAL_OBJ, NodeFactory::UNIVERSAL_OBJ),
        Constraint::addr_of(NodeFactory::NULL_PTR, NodeFactory::NULL_OBJ),
    ]
}

/// A long copy chain rooted at an address-of: worst case for pure
/// propagation, no cycles at all.
fn copy_chain(n: usize) -> (NodeFactory, Vec<Constraint>) {
    let mut factory = NodeFactory::new();
    let mut cs = seeds();
    let obj = factory.create_object_node(None);
    let mut prev = factory.create_value_node(None);
    cs.push(Constraint::addr_of(prev, obj));
    for _ in 0..n {
        let next = factory.create_value_node(None);
        cs.push(Constraint::copy(next, prev));
        prev = next;
    }
    (factory, cs)
}

/// Rings of copy edges with address-of entries: exercises the cycle
/// detectors.
fn copy_rings(rings: usize, ring_size: usize) -> (NodeFactory, Vec<Constraint>) {
    let mut factory = NodeFactory::new();
    let mut cs = seeds();
    for _ in 0..rings {
        let obj = factory.create_object_node(None);
        let first = factory.create_value_node(None);
        cs.push(Constraint::addr_of(first, obj));
        let mut prev = first;
        for _ in 1..ring_size {
            let next = factory.create_value_node(None);
            cs.push(Constraint::copy(next, prev));
            prev = next;
        }
        cs.push(Constraint::copy(first, prev));
    }
    (factory, cs)
}

/// Store/load traffic through a set of shared cells.
fn load_store_mesh(cells: usize, users: usize) -> (NodeFactory, Vec<Constraint>) {
    let mut factory = NodeFactory::new();
    let mut cs = seeds();
    let mut pointers = Vec::new();
    for _ in 0..cells {
        let obj = factory.create_object_node(None);
        let ptr = factory.create_value_node(None);
        cs.push(Constraint::addr_of(ptr, obj));
        pointers.push(ptr);
    }
    for i in 0..users {
        let src = factory.create_value_node(None);
        let src_obj = factory.create_object_node(None);
        cs.push(Constraint::addr_of(src, src_obj));
        let dst = factory.create_value_node(None);
        let ptr = pointers[i % pointers.len()];
        cs.push(Constraint::store(ptr, src));
        cs.push(Constraint::load(dst, ptr));
    }
    (factory, cs)
}

fn bench_copy_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver/copy_chain");
    for n in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let (mut factory, cs) = copy_chain(n);
                let mut pts = PointsToIndex::new();
                solver::solve(&mut factory, &cs, &mut pts, true, true);
                pts.len()
            });
        });
    }
    group.finish();
}

fn bench_copy_rings(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver/copy_rings");
    for (rings, size) in [(10usize, 100usize), (100, 100)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", rings, size)),
            &(rings, size),
            |b, &(rings, size)| {
                b.iter(|| {
                    let (mut factory, cs) = copy_rings(rings, size);
                    let mut pts = PointsToIndex::new();
                    solver::solve(&mut factory, &cs, &mut pts, true, true);
                    pts.len()
                });
            },
        );
    }
    group.finish();
}

fn bench_load_store_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver/load_store_mesh");
    for (cells, users) in [(10usize, 1_000usize), (100, 1_000)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", cells, users)),
            &(cells, users),
            |b, &(cells, users)| {
                b.iter(|| {
                    let (mut factory, cs) = load_store_mesh(cells, users);
                    let mut pts = PointsToIndex::new();
                    solver::solve(&mut factory, &cs, &mut pts, true, true);
                    pts.len()
                });
            },
        );
    }
    group.finish();
}

fn bench_hvn_reduction(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver/hvn");
    group.bench_function("chain_10k", |b| {
        b.iter(|| {
            let (mut factory, mut cs) = copy_chain(10_000);
            HvnOptimizer::new(&mut factory, &mut cs).run();
            cs.len()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_copy_chain,
    bench_copy_rings,
    bench_hvn_reduction,
    bench_load_store_mesh,
);

criterion_main!(benches);
