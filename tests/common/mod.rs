//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use doccmd_core::{
    config::{DocumentConfig, StaticConfigProvider, TomlConfigProvider},
    context::DocumentContext,
    event::Event,
    host::MemoryDocument,
};
use std::{
    path::PathBuf,
    sync::{
        mpsc::{channel, Receiver},
        Arc,
    },
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// The letter fixture and its configuration.
#[allow(dead_code)]
pub fn letter() -> (MemoryDocument, TomlConfigProvider) {
    let doc = MemoryDocument::load_fixture(fixture_path("letter.toml")).unwrap();
    let config = TomlConfigProvider::new(fixture_path("letter_config.toml"));
    (doc, config)
}

/// A context over a clone of `doc`, reporting events on the returned receiver.
#[allow(dead_code)]
pub fn context_with_events(
    doc: &MemoryDocument,
    config: DocumentConfig,
) -> (DocumentContext, Receiver<Event>) {
    let (tx, rx) = channel();
    let ctx = DocumentContext::new(
        Box::new(doc.clone()),
        Arc::new(StaticConfigProvider::new(config)),
    )
    .with_events(tx);
    (ctx, rx)
}

#[allow(dead_code)]
pub fn count_events(rx: &Receiver<Event>, pred: impl Fn(&Event) -> bool) -> usize {
    rx.try_iter().filter(|e| pred(e)).count()
}
