// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # es-reindex
//!
//! `es-reindex` is a CLI tool and library for copying documents out of a
//! search cluster with a scroll query and into another cluster with bulk
//! requests, a JSON-lines file, or both.
//!
//! ## Pieces
//!
//! | Piece | Role |
//! |-------|------|
//! | [`ScrollCursor`] | Pages through one index until an empty page |
//! | [`BulkBatcher`] | Groups documents into `_bulk` requests, one in flight |
//! | [`Pipeline`] | Feeds every document to every consumer, in order |
//! | [`FileSink`] | Archives documents as JSON lines, optionally gzip |
//! | [`FailureCollector`] | Keeps rejected documents for the final report |
//!
//! ## Quick Start
//!
//! ```bash
//! # Copy an index to another cluster, renaming it on the way
//! es-reindex --from old-cluster --to new-cluster copy products -r products-v2
//!
//! # Export only, gzip-compressed
//! es-reindex --from localhost copy products -o products.jsonl.gz
//!
//! # Replay an export
//! es-reindex --to localhost:9201 import products.jsonl.gz
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   url: http://localhost:9200
//!   index: products
//!   page_size: 1000
//!   delay_ms: 100
//!
//! destination:
//!   url: http://localhost:9201
//!   batch_size: 1000
//!   rename: products-v2
//! ```

#![warn(missing_docs)]

pub mod batcher;
pub mod bulk;
pub mod config;
pub mod connectors;
pub mod consumers;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod retry;

pub use batcher::{BatcherState, BulkBatcher};
pub use bulk::{BulkResponse, BulkTransport, HttpBulkClient};
pub use config::{DestinationConfig, MigrationConfig, MigrationOptions, OutputConfig, SourceConfig};
pub use connectors::{DocumentSource, JsonlFileSource, ScrollCursor, ScrollState};
pub use consumers::{ExportProgress, FileSink, ReindexConsumer};
pub use document::{Document, DocumentOutcome, FailedDocument, Outcome};
pub use error::{Error, Result};
pub use pipeline::{
    import_file, run_migration, DocumentConsumer, DocumentView, MigrationReport, Pipeline,
    RunFailure, RunResult,
};
pub use progress::{FailureCollector, ProgressTracker};
pub use retry::RetryConfig;
