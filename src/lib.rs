//! # doccmd-core
//!
//! A Rust library for discovering commands embedded in rich-text documents, arranging them into a
//! conflict-checked tree and executing them one at a time.
//!
//! ## Overview
//!
//! A host document (a word processor, an in-memory stand-in) stores named markers, each bound to
//! a range of text. Markers whose name is a `CMD(...)` descriptor are commands: insert a text
//! fragment here, fill in a value there, ask the user for form input. Nothing tells us in which
//! order or nesting the markers come, so the tree is reconstructed from the ranges alone, and
//! every document change that may affect commands is funnelled through a single worker so the
//! tree is never mutated concurrently.
//!
//! ### Key Features
//!
//! - **Interval classification**: nine-way relation between two anchored ranges
//! - **Incremental tree building**: commands can be discovered in any order and nest correctly
//! - **Conflict detection**: partially overlapping markers are flagged, never silently nested
//! - **Status write-back**: done flags and error counts are persisted in the marker names
//! - **Sequential engine**: FIFO queue with pause/resume for operations that wait on a user
//!
//! ## Architecture
//!
//! - **[`relation`]**: range classification (`RangeRelation`, `TextSpan`)
//! - **[`host`]**: the host document surface (`HostDocument`, `AnchoredRange`) and an in-memory
//!   implementation
//! - **[`descriptor`]**: the structured descriptor grammar and command kinds
//! - **[`tree`]**: the command tree, traversal and invariant checks
//! - **[`scanner`]**: incremental marker discovery
//! - **[`command`]**: per-kind execution and insert-mark cleanup
//! - **[`engine`]**: the sequential processing engine
//! - **[`context`]** and **[`ops`]**: per-document state and the standard operations
//! - **[`config`]**: document configuration (fragments, values, settings)
//! - **[`event`]**: change notifications
//!
//! ## Quick Start
//!
//! ```rust
//! use doccmd_core::{
//!     config::{DocumentConfig, StaticConfigProvider},
//!     context::DocumentContext,
//!     engine::Engine,
//!     host::MemoryDocument,
//!     ops::Op,
//!     relation::FlowId,
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = MemoryDocument::new("Dear ____,");
//! doc.add_marker("CMD(KIND 'insertValue' ID 'Name')", FlowId(0), 5, 9)?;
//!
//! let mut config = DocumentConfig::default();
//! config.values.insert("Name".to_string(), "Ada".to_string());
//!
//! let ctx = DocumentContext::new(
//!     Box::new(doc.clone()),
//!     Arc::new(StaticConfigProvider::new(config)),
//! );
//! let engine = Engine::start(ctx)?;
//! engine.submit(Op::Process);
//! engine.handle().wait_settled(Duration::from_secs(5));
//! engine.shutdown()?;
//!
//! assert_eq!(doc.body(), "Dear Ada,");
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `doccmd` command line tool (`clap`, `tracing-subscriber`)

pub mod command;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod event;
pub mod host;
pub mod ops;
pub mod relation;
pub mod scanner;
pub mod transform;
pub mod tree;

pub use error::*;
