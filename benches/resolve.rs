//! Benchmarks for name resolution against the namespace tree.
//!
//! These benchmarks measure exact, glob and partial lookups over trees
//! of various sizes, which dominate the cost of option merging and
//! dependency resolution on large module sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use modbuild::node::{NodeKind, Tree};
use modbuild::option::{OptionData, OptionKind};
use modbuild::resolver::fill_partial_name;

/// A tree with `modules` modules under one repository, each carrying
/// four options.
fn tree_with_modules(modules: usize) -> Tree {
    let mut tree = Tree::new("modbuild");
    let repo = tree
        .add_child(tree.root, "repo", NodeKind::Repository)
        .unwrap();
    for index in 0..modules {
        let module = tree
            .add_child(repo, &format!("module{index}"), NodeKind::Module)
            .unwrap();
        for option in ["baudrate", "parity", "buffer", "irq"] {
            tree.add_child(
                module,
                option,
                NodeKind::Option(OptionData::new(OptionKind::String)),
            )
            .unwrap();
        }
    }
    tree.update();
    tree
}

fn bench_resolve_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_exact");
    for size in [10, 100, 1000] {
        let tree = tree_with_modules(size);
        let query = format!("repo:module{}:baudrate", size / 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| tree.resolve(black_box(&query)));
        });
    }
    group.finish();
}

fn bench_resolve_glob(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_glob");
    for size in [10, 100, 1000] {
        let tree = tree_with_modules(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| tree.resolve(black_box("repo:*:baudrate")));
        });
    }
    group.finish();
}

fn bench_resolve_recursive_glob(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_recursive_glob");
    for size in [10, 100, 1000] {
        let tree = tree_with_modules(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| tree.resolve(black_box("repo:**")));
        });
    }
    group.finish();
}

fn bench_resolve_partial(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_partial");
    for size in [10, 100, 1000] {
        let tree = tree_with_modules(size);
        let module = tree.resolve(&format!("repo:module{}", size / 2))[0];
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| tree.resolve_partial(black_box(module), black_box("baudrate")));
        });
    }
    group.finish();
}

fn bench_fill_partial_name(c: &mut Criterion) {
    let scope: Vec<String> = vec![
        "repo".to_string(),
        "module".to_string(),
        "submodule".to_string(),
    ];
    let partial: Vec<String> = vec![String::new(), String::new(), "option".to_string()];
    c.bench_function("fill_partial_name", |b| {
        b.iter(|| fill_partial_name(black_box(&partial), black_box(&scope)));
    });
}

criterion_group!(
    benches,
    bench_resolve_exact,
    bench_resolve_glob,
    bench_resolve_recursive_glob,
    bench_resolve_partial,
    bench_fill_partial_name
);
criterion_main!(benches);
