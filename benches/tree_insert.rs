//! Performance benchmarks for command tree construction
//!
//! - Inserting nested and sibling ranges discovered in scrambled order
//! - Scanning a document full of markers
//! - A full processing run of value commands
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use doccmd_core::{
    config::{DocumentConfig, StaticConfigProvider},
    context::DocumentContext,
    descriptor::parse_marker,
    host::{HostDocument, MemoryDocument},
    relation::FlowId,
    tree::{CommandNode, CommandTree},
};
use std::sync::Arc;

const SECTIONS: usize = 40;
const FIELDS: usize = 10;
const FIELD_WIDTH: usize = 4;
const SECTION_WIDTH: usize = FIELDS * (FIELD_WIDTH + 1);

/// A body of `SECTIONS` sections, each holding `FIELDS` placeholders, with one marker per
/// section and one per placeholder. Returns the document and its marker names.
fn sectioned_document() -> (MemoryDocument, Vec<String>) {
    let text = "____ ".repeat(SECTIONS * FIELDS);
    let doc = MemoryDocument::new(&text);
    let mut names = Vec::new();
    for s in 0..SECTIONS {
        let start = s * SECTION_WIDTH;
        names.push(
            doc.add_marker(
                &format!("CMD(KIND 'insertContent') {s}"),
                FlowId(0),
                start,
                start + SECTION_WIDTH,
            )
            .unwrap(),
        );
        for f in 0..FIELDS {
            let field = start + f * (FIELD_WIDTH + 1);
            names.push(
                doc.add_marker(
                    &format!("CMD(KIND 'insertValue' ID 'v{f}') {s}"),
                    FlowId(0),
                    field,
                    field + FIELD_WIDTH,
                )
                .unwrap(),
            );
        }
    }
    (doc, names)
}

/// Visits every index exactly once in a scrambled order; `len` must not be a multiple of the
/// stride.
fn scrambled(len: usize) -> impl Iterator<Item = usize> {
    const STRIDE: usize = 7919;
    (0..len).map(move |i| (i * STRIDE) % len)
}

fn bench_tree_insert(c: &mut Criterion) {
    let (doc, names) = sectioned_document();

    c.bench_function("tree_insert_scrambled", |b| {
        b.iter(|| {
            let mut tree = CommandTree::new();
            for idx in scrambled(names.len()) {
                let name = &names[idx];
                let range = doc.resolve(name).unwrap();
                let descriptor = parse_marker(name).unwrap();
                tree.insert(CommandNode::new(name.clone(), range, descriptor));
            }
            black_box(tree.len())
        })
    });
}

fn bench_scan(c: &mut Criterion) {
    let (doc, _) = sectioned_document();

    c.bench_function("scan_document", |b| {
        b.iter(|| {
            let mut ctx = DocumentContext::new(
                Box::new(doc.clone()),
                Arc::new(StaticConfigProvider::default()),
            );
            black_box(ctx.scan())
        })
    });
}

fn bench_execute_values(c: &mut Criterion) {
    let mut config = DocumentConfig::default();
    for f in 0..FIELDS {
        config.values.insert(format!("v{f}"), format!("value {f}"));
    }

    c.bench_function("execute_values", |b| {
        b.iter(|| {
            let doc = MemoryDocument::new(&"____ ".repeat(SECTIONS * FIELDS));
            for i in 0..SECTIONS * FIELDS {
                let start = i * (FIELD_WIDTH + 1);
                doc.add_marker(
                    &format!("CMD(KIND 'insertValue' ID 'v{}') {i}", i % FIELDS),
                    FlowId(0),
                    start,
                    start + FIELD_WIDTH,
                )
                .unwrap();
            }
            let mut ctx = DocumentContext::new(
                Box::new(doc.clone()),
                Arc::new(StaticConfigProvider::new(config.clone())),
            );
            ctx.scan();
            black_box(ctx.execute_pass(&config))
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(30);
    targets =
        bench_tree_insert,
        bench_scan,
        bench_execute_values,
}
criterion_main!(benches);
