//! Migration pipeline orchestration.
//!
//! One source, many consumers. Each document is offered to every consumer
//! before the next one is pulled, so the slowest consumer sets the pace and
//! nothing is buffered beyond what the consumers themselves hold.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::batcher::BulkBatcher;
use crate::bulk::{BulkTransport, HttpBulkClient};
use crate::config::{DestinationConfig, MigrationConfig, MigrationOptions};
use crate::connectors::{DocumentSource, JsonlFileSource, ScrollCursor};
use crate::consumers::{ExportProgress, FileSink, ReindexConsumer};
use crate::document::{Document, FailedDocument};
use crate::error::Error;
use crate::progress::ProgressTracker;

/// Which version of a document a consumer receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentView {
    /// The document exactly as the source returned it.
    Original,
    /// The document with the rename target applied, if any.
    Destination,
}

/// A stage receiving every document of a run.
#[async_trait]
pub trait DocumentConsumer: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Defaults to the renamed view.
    fn view(&self) -> DocumentView {
        DocumentView::Destination
    }

    /// Called once before the first document with the source's estimate.
    fn start(&mut self, _total: Option<u64>) {}

    /// Takes one document. An error aborts the run.
    async fn accept(&mut self, document: &Document) -> crate::Result<()>;

    /// End of stream: flush buffered state and wait for it to settle.
    async fn finish(&mut self) -> crate::Result<()>;

    /// The run stopped on a fatal error. Settle work already handed off, but
    /// start nothing new. May follow `finish` when a later consumer failed.
    async fn abort(&mut self) {}

    /// Adds this consumer's figures to the report. Called on success and on
    /// abort.
    fn summarize(&mut self, _report: &mut MigrationReport) {}
}

/// Figures of a finished or aborted run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Documents pulled from the source.
    pub exported: u64,
    /// Size the source declared up front, if any.
    pub declared_total: Option<u64>,
    /// Documents the destination acknowledged.
    pub indexed: u64,
    /// Documents written to the output file.
    pub written_to_file: u64,
    /// Bulk requests sent.
    pub flushes: u64,
    /// Documents the destination rejected.
    pub failures: Vec<FailedDocument>,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
}

impl MigrationReport {
    /// Number of rejected documents.
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    /// Documents exported per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.exported as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// A run that stopped on a fatal error, with what was achieved before it.
#[derive(Debug, thiserror::Error)]
#[error("migration aborted: {error}")]
pub struct RunFailure {
    /// The fatal error.
    #[source]
    pub error: Error,
    /// Figures up to the abort, including rejections from acknowledged flushes.
    pub report: MigrationReport,
}

impl From<Error> for RunFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            report: MigrationReport::default(),
        }
    }
}

/// Result of a run.
pub type RunResult = std::result::Result<MigrationReport, RunFailure>;

/// Migration pipeline.
#[derive(Default)]
pub struct Pipeline {
    consumers: Vec<Box<dyn DocumentConsumer>>,
    rename: Option<String>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites the index of every document handed to destination consumers.
    #[must_use]
    pub fn with_rename(mut self, rename: Option<String>) -> Self {
        self.rename = rename;
        self
    }

    /// Registers a consumer. Consumers see each document in registration order.
    pub fn add_consumer(&mut self, consumer: Box<dyn DocumentConsumer>) {
        self.consumers.push(consumer);
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Drains `source` into every consumer.
    ///
    /// Resolves once the source is exhausted and every consumer has
    /// finished. The first fatal error stops the run; the returned
    /// [`RunFailure`] still carries the failures collected so far.
    ///
    /// # Errors
    ///
    /// Any source or consumer error.
    pub async fn run<S>(&mut self, source: &mut S) -> RunResult
    where
        S: DocumentSource + ?Sized,
    {
        let started = Instant::now();
        let mut report = MigrationReport {
            declared_total: source.total_hint(),
            ..Default::default()
        };

        info!(
            "Starting migration from {} source ({} consumers)",
            source.source_type(),
            self.consumers.len()
        );

        for consumer in &mut self.consumers {
            consumer.start(report.declared_total);
        }

        let outcome = self.drain(source, &mut report).await;

        if let Err(e) = source.close().await {
            warn!("Closing {} source failed: {}", source.source_type(), e);
        }
        if outcome.is_err() {
            for consumer in &mut self.consumers {
                consumer.abort().await;
            }
        }
        for consumer in &mut self.consumers {
            consumer.summarize(&mut report);
        }
        report.duration_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                info!(
                    "Migration complete: {} exported, {} indexed, {} failed in {:.2}s ({:.0} docs/sec)",
                    report.exported,
                    report.indexed,
                    report.failed(),
                    report.duration_secs,
                    report.throughput()
                );
                Ok(report)
            }
            Err(error) => {
                warn!(
                    "Migration aborted after {} documents: {}",
                    report.exported, error
                );
                Err(RunFailure { error, report })
            }
        }
    }

    async fn drain<S>(&mut self, source: &mut S, report: &mut MigrationReport) -> crate::Result<()>
    where
        S: DocumentSource + ?Sized,
    {
        while let Some(document) = source.next_document().await? {
            report.exported += 1;
            let renamed = self.rename.as_deref().map(|name| document.renamed(name));

            for consumer in &mut self.consumers {
                let view = match consumer.view() {
                    DocumentView::Original => &document,
                    DocumentView::Destination => renamed.as_ref().unwrap_or(&document),
                };
                consumer.accept(view).await?;
            }
        }

        for consumer in &mut self.consumers {
            consumer.finish().await?;
            debug!("Consumer '{}' finished", consumer.name());
        }
        Ok(())
    }
}

fn reindex_consumer(
    destination: &DestinationConfig,
    options: &MigrationOptions,
    progress: &ProgressTracker,
) -> crate::Result<ReindexConsumer> {
    let transport: Arc<dyn BulkTransport> = Arc::new(HttpBulkClient::new(destination)?);
    let batcher = BulkBatcher::new(transport, destination.batch_size)
        .with_timeout(destination.timeout())
        .with_retry(options.retry.to_retry_config());
    Ok(ReindexConsumer::new(batcher).with_progress(progress))
}

/// Runs the scroll export described by `config` into its destination
/// and/or output file.
///
/// # Errors
///
/// Invalid configuration, or any fatal error during the run.
pub async fn run_migration(config: &MigrationConfig) -> RunResult {
    config.validate()?;

    let progress = ProgressTracker::new(config.options.quiet);
    let mut pipeline = Pipeline::new().with_rename(
        config
            .destination
            .as_ref()
            .and_then(|d| d.rename.clone()),
    );
    pipeline.add_consumer(Box::new(ExportProgress::new(&progress)));

    if let Some(output) = &config.output {
        let sink = FileSink::create(&output.path, output.is_gzip())?.with_progress(&progress);
        pipeline.add_consumer(Box::new(sink));
    }
    if let Some(destination) = &config.destination {
        let consumer = reindex_consumer(destination, &config.options, &progress)?;
        pipeline.add_consumer(Box::new(consumer));
    }

    let retry = config.options.retry.to_retry_config();
    let mut cursor = ScrollCursor::open(config.source.clone(), retry).await?;
    pipeline.run(&mut cursor).await
}

/// Imports a JSON-lines export into `destination`.
///
/// # Errors
///
/// Invalid destination, unreadable file, or any fatal error during the run.
pub async fn import_file(
    path: &Path,
    gzip: bool,
    destination: &DestinationConfig,
    options: &MigrationOptions,
) -> RunResult {
    if destination.batch_size == 0 {
        return Err(Error::Config("batch_size must be greater than 0".to_string()).into());
    }

    let progress = ProgressTracker::new(options.quiet);
    let mut source = JsonlFileSource::open(path, gzip)?;
    let mut pipeline = Pipeline::new().with_rename(destination.rename.clone());
    pipeline.add_consumer(Box::new(reindex_consumer(destination, options, &progress)?));

    pipeline.run(&mut source).await
}
