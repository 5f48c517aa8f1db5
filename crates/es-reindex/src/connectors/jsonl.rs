//! JSON-lines file source, the counterpart of the file sink.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::has_gz_extension;
use crate::connectors::DocumentSource;
use crate::document::Document;
use crate::error::{Error, Result};

/// Reads documents written by the file sink, one JSON object per line.
pub struct JsonlFileSource {
    path: PathBuf,
    reader: Option<Box<dyn BufRead + Send>>,
    line_number: usize,
    emitted: u64,
}

impl JsonlFileSource {
    /// Opens `path`, decompressing when it ends in `.gz` or `gzip` is set.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, gzip: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open '{}': {}", path.display(), e),
            ))
        })?;

        let compressed = gzip || has_gz_extension(&path);
        let reader: Box<dyn BufRead + Send> = if compressed {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        info!(
            "Reading documents from {}{}",
            path.display(),
            if compressed { " (gzip)" } else { "" }
        );

        Ok(Self {
            path,
            reader: Some(reader),
            line_number: 0,
            emitted: 0,
        })
    }

    /// Path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&mut self) -> Result<Option<Document>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                debug!(
                    "Reached end of {} after {} documents",
                    self.path.display(),
                    self.emitted
                );
                self.reader = None;
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let doc: Document = serde_json::from_str(trimmed).map_err(|e| {
                Error::Protocol(format!(
                    "{} line {}: {}",
                    self.path.display(),
                    self.line_number,
                    e
                ))
            })?;
            self.emitted += 1;
            return Ok(Some(doc));
        }
    }
}

#[async_trait]
impl DocumentSource for JsonlFileSource {
    fn source_type(&self) -> &'static str {
        "jsonl_file"
    }

    fn total_hint(&self) -> Option<u64> {
        None
    }

    async fn next_document(&mut self) -> Result<Option<Document>> {
        self.read_document()
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
