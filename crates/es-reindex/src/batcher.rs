//! Size-bounded batching writer.
//!
//! Documents accumulate until `batch_size` is reached, then the batch is
//! flushed in a background task while the next one fills. At most one flush
//! is in flight: a second full batch waits for the first to be acknowledged
//! before it is sent, so at most two batches are ever resident.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bulk::{encode_bulk_body, BulkTransport};
use crate::connectors::common::DEFAULT_TIMEOUT;
use crate::document::{Document, DocumentOutcome};
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};

/// Externally visible state of a batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    /// Nothing buffered, nothing in flight.
    Idle,
    /// Documents buffered, nothing in flight.
    Filling,
    /// A flush is awaiting its response.
    Flushing,
}

type FlushHandle = JoinHandle<Result<Vec<DocumentOutcome>>>;

/// Batches documents into bulk requests and reports per-document outcomes.
pub struct BulkBatcher {
    transport: Arc<dyn BulkTransport>,
    batch_size: usize,
    flush_timeout: Duration,
    retry: RetryConfig,
    pending: Vec<Document>,
    in_flight: Option<FlushHandle>,
    flushes: u64,
    written: u64,
    closed: bool,
}

impl BulkBatcher {
    /// Creates a batcher flushing every `batch_size` documents.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(transport: Arc<dyn BulkTransport>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            transport,
            batch_size,
            flush_timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::no_retry(),
            pending: Vec::with_capacity(batch_size),
            in_flight: None,
            flushes: 0,
            written: 0,
            closed: false,
        }
    }

    /// Sets the response timeout applied to each flush.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Sets the retry policy for whole-batch transport failures.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Current state.
    pub fn state(&self) -> BatcherState {
        if self.in_flight.is_some() {
            BatcherState::Flushing
        } else if self.pending.is_empty() {
            BatcherState::Idle
        } else {
            BatcherState::Filling
        }
    }

    /// Number of flushes started so far.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Number of documents accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Documents buffered in the batch being filled.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enqueues a document.
    ///
    /// Returns outcomes of any flush that completed during this call, in
    /// write order. When the batch fills while a previous flush is still
    /// outstanding, this waits for that flush before sending the new one.
    ///
    /// # Errors
    ///
    /// A failed flush (transport error, timeout, malformed response) is
    /// fatal: the error is returned and the batcher accepts no more writes.
    pub async fn write(&mut self, document: Document) -> Result<Vec<DocumentOutcome>> {
        if self.closed {
            return Err(Error::Config("write to a closed batcher".to_string()));
        }

        let mut outcomes = if self
            .in_flight
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
        {
            self.await_in_flight().await?
        } else {
            Vec::new()
        };

        self.pending.push(document);
        self.written += 1;

        if self.pending.len() >= self.batch_size {
            outcomes.extend(self.await_in_flight().await?);
            self.start_flush();
        }

        Ok(outcomes)
    }

    /// Flushes the remaining partial batch and waits for every outstanding
    /// flush. The batcher is closed afterwards.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub async fn end(&mut self) -> Result<Vec<DocumentOutcome>> {
        if self.closed {
            return Ok(Vec::new());
        }

        let mut outcomes = self.await_in_flight().await?;
        if !self.pending.is_empty() {
            self.start_flush();
            outcomes.extend(self.await_in_flight().await?);
        }
        self.closed = true;

        debug!(
            "Batcher finished: {} documents in {} flushes",
            self.written, self.flushes
        );
        Ok(outcomes)
    }

    /// Stops the batcher after the run failed elsewhere.
    ///
    /// Waits for the flush in flight, if any, and returns its outcomes so
    /// rejections the destination already reported are not lost. The batch
    /// being filled is discarded unsent.
    ///
    /// # Errors
    ///
    /// The in-flight flush failed.
    pub async fn abandon(&mut self) -> Result<Vec<DocumentOutcome>> {
        let outcomes = self.await_in_flight().await;
        if !self.pending.is_empty() {
            debug!("Discarding {} unsent documents", self.pending.len());
            self.pending.clear();
        }
        self.closed = true;
        outcomes
    }

    fn start_flush(&mut self) {
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        self.flushes += 1;
        debug!("Flush {}: sending {} documents", self.flushes, batch.len());

        let transport = Arc::clone(&self.transport);
        let timeout = self.flush_timeout;
        let retry = self.retry.clone();
        self.in_flight = Some(tokio::spawn(flush_batch(transport, batch, timeout, retry)));
    }

    async fn await_in_flight(&mut self) -> Result<Vec<DocumentOutcome>> {
        let Some(handle) = self.in_flight.take() else {
            return Ok(Vec::new());
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Transport(format!("bulk flush task failed: {e}"))),
        };

        if result.is_err() {
            self.closed = true;
            self.pending.clear();
        }
        result
    }
}

impl Drop for BulkBatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            warn!("Batcher dropped with a flush in flight, aborting it");
            handle.abort();
        }
    }
}

async fn flush_batch(
    transport: Arc<dyn BulkTransport>,
    batch: Vec<Document>,
    timeout: Duration,
    retry: RetryConfig,
) -> Result<Vec<DocumentOutcome>> {
    let body = encode_bulk_body(&batch)?;

    let response = with_retry(&retry, "bulk flush", || {
        let transport = Arc::clone(&transport);
        let body = body.clone();
        async move {
            match tokio::time::timeout(timeout, transport.send_bulk(body)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Transport(format!(
                    "bulk flush timed out after {}s",
                    timeout.as_secs_f64()
                ))),
            }
        }
    })
    .await?;

    response.correlate(batch)
}

#[cfg(test)]
#[path = "batcher_tests.rs"]
mod tests;
