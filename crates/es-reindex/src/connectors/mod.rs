//! Document sources feeding the migration pipeline.

pub mod common;
pub mod jsonl;
pub mod scroll;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Result;

pub use jsonl::JsonlFileSource;
pub use scroll::{ScrollCursor, ScrollState};

/// A single-producer stream of documents.
///
/// `next_document` yields documents in source order, `Ok(None)` once the
/// source is exhausted, or an error that ends the stream. Nothing is yielded
/// after `Ok(None)`.
#[async_trait]
pub trait DocumentSource: Send {
    /// Get the source type name.
    fn source_type(&self) -> &'static str;

    /// Estimated number of documents, for progress display only.
    fn total_hint(&self) -> Option<u64>;

    /// Pull the next document.
    async fn next_document(&mut self) -> Result<Option<Document>>;

    /// Release server-side or local resources.
    async fn close(&mut self) -> Result<()>;
}
