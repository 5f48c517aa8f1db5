//! Consumers fed by the pipeline: export progress, file sink, re-index.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::batcher::BulkBatcher;
use crate::config::has_gz_extension;
use crate::document::{Document, DocumentOutcome};
use crate::error::Result;
use crate::pipeline::{DocumentConsumer, DocumentView, MigrationReport};
use crate::progress::{FailureCollector, ProgressTracker};

/// Ticks the `export` bar for every document pulled from the source.
pub struct ExportProgress {
    bar: ProgressBar,
}

impl ExportProgress {
    /// Creates the consumer with its bar registered on `tracker`.
    pub fn new(tracker: &ProgressTracker) -> Self {
        Self {
            bar: tracker.add_bar("export"),
        }
    }
}

#[async_trait]
impl DocumentConsumer for ExportProgress {
    fn name(&self) -> &'static str {
        "export"
    }

    fn view(&self) -> DocumentView {
        DocumentView::Original
    }

    fn start(&mut self, total: Option<u64>) {
        if let Some(total) = total {
            self.bar.set_length(total);
        }
    }

    async fn accept(&mut self, _document: &Document) -> Result<()> {
        self.bar.inc(1);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.bar.finish();
        Ok(())
    }

    async fn abort(&mut self) {
        self.bar.abandon();
    }
}

enum SinkWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl SinkWriter {
    fn as_write(&mut self) -> &mut (dyn Write + Send) {
        match self {
            Self::Plain(w) => w,
            Self::Gzip(w) => w,
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gzip(w) => w.finish()?.flush(),
        }
    }
}

/// Writes every document as one JSON line, with its original index name.
pub struct FileSink {
    path: PathBuf,
    writer: Option<SinkWriter>,
    written: u64,
    bar: Option<ProgressBar>,
}

impl FileSink {
    /// Creates (truncating) `path`. Gzip is used when `gzip` is set or the
    /// file name ends in `.gz`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>, gzip: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = BufWriter::new(File::create(&path)?);
        let writer = if gzip || has_gz_extension(&path) {
            SinkWriter::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            SinkWriter::Plain(file)
        };
        info!("Writing documents to {}", path.display());

        Ok(Self {
            path,
            writer: Some(writer),
            written: 0,
            bar: None,
        })
    }

    /// Shows a `file` bar on `tracker`.
    #[must_use]
    pub fn with_progress(mut self, tracker: &ProgressTracker) -> Self {
        self.bar = Some(tracker.add_bar("file"));
        self
    }

    /// Lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl DocumentConsumer for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn view(&self) -> DocumentView {
        DocumentView::Original
    }

    fn start(&mut self, total: Option<u64>) {
        if let (Some(bar), Some(total)) = (&self.bar, total) {
            bar.set_length(total);
        }
    }

    async fn accept(&mut self, document: &Document) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let out = writer.as_write();
        serde_json::to_writer(&mut *out, document)?;
        out.write_all(b"\n")?;
        self.written += 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
            debug!("Closed {} after {} lines", self.path.display(), self.written);
        }
        if let Some(bar) = &self.bar {
            bar.finish();
        }
        Ok(())
    }

    async fn abort(&mut self) {
        // Keep what was exported so far readable, gzip trailer included.
        if let Err(e) = self.finish().await {
            warn!("Closing {} after abort failed: {}", self.path.display(), e);
        }
    }

    fn summarize(&mut self, report: &mut MigrationReport) {
        report.written_to_file = self.written;
    }
}

/// Feeds documents to a [`BulkBatcher`] and collects outcomes.
pub struct ReindexConsumer {
    batcher: BulkBatcher,
    collector: FailureCollector,
    total: Option<u64>,
    bar: Option<ProgressBar>,
}

impl ReindexConsumer {
    /// Wraps a configured batcher.
    pub fn new(batcher: BulkBatcher) -> Self {
        Self {
            batcher,
            collector: FailureCollector::new(),
            total: None,
            bar: None,
        }
    }

    /// Shows an `import` bar on `tracker`.
    #[must_use]
    pub fn with_progress(mut self, tracker: &ProgressTracker) -> Self {
        self.bar = Some(tracker.add_bar("import"));
        self
    }

    /// Outcomes recorded so far.
    pub fn collector(&self) -> &FailureCollector {
        &self.collector
    }

    fn record(&mut self, outcomes: &[DocumentOutcome]) {
        if outcomes.is_empty() {
            return;
        }
        self.collector.record_all(outcomes);
        if let Some(bar) = &self.bar {
            bar.inc(outcomes.len() as u64);
            bar.set_message(import_message(
                self.collector.processed(),
                self.total,
                self.collector.failed(),
            ));
        }
    }
}

fn import_message(processed: u64, total: Option<u64>, failed: u64) -> String {
    match total {
        Some(total) => format!("{processed} / {total} ({failed} failed)"),
        None => format!("{processed} ({failed} failed)"),
    }
}

#[async_trait]
impl DocumentConsumer for ReindexConsumer {
    fn name(&self) -> &'static str {
        "import"
    }

    fn start(&mut self, total: Option<u64>) {
        self.total = total;
        if let (Some(bar), Some(total)) = (&self.bar, total) {
            bar.set_length(total);
        }
    }

    async fn accept(&mut self, document: &Document) -> Result<()> {
        let outcomes = self.batcher.write(document.clone()).await?;
        self.record(&outcomes);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let outcomes = self.batcher.end().await?;
        self.record(&outcomes);
        if let Some(bar) = &self.bar {
            bar.finish();
        }
        Ok(())
    }

    async fn abort(&mut self) {
        match self.batcher.abandon().await {
            Ok(outcomes) => self.record(&outcomes),
            Err(e) => warn!("Bulk flush in flight at abort failed: {}", e),
        }
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }

    fn summarize(&mut self, report: &mut MigrationReport) {
        report.indexed = self.collector.succeeded();
        report.flushes = self.batcher.flushes();
        report.failures.extend(self.collector.take_failures());
    }
}
