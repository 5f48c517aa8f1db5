//! Documents moved through the pipeline and the outcome of writing them.

use serde::{Deserialize, Serialize};

/// A single document as returned in a search hit.
///
/// `source` is opaque: the pipeline never looks inside it. The only field
/// that may change on the way through is `index`, when a rename target is
/// configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Container (index) the document lives in, or will be written to.
    #[serde(rename = "_index")]
    pub index: String,
    /// Legacy mapping type.
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Stable identifier. `None` lets the destination generate one.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Document payload.
    #[serde(rename = "_source", default)]
    pub source: serde_json::Value,
}

impl Document {
    /// Creates a document with a known id and no legacy type.
    pub fn new(index: impl Into<String>, id: Option<String>, source: serde_json::Value) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            id,
            source,
        }
    }

    /// Returns a copy that will be written to `index` instead.
    #[must_use]
    pub fn renamed(&self, index: &str) -> Self {
        Self {
            index: index.to_string(),
            ..self.clone()
        }
    }

    /// Short human-readable reference used in logs and failure reports.
    pub fn reference(&self) -> String {
        match &self.id {
            Some(id) => format!("{}/{}", self.index, id),
            None => format!("{}/<auto>", self.index),
        }
    }
}

/// Result of attempting to write one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The destination acknowledged the document.
    Succeeded,
    /// The destination rejected the document; the run continues.
    Failed(String),
}

impl Outcome {
    /// Returns true if the write succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// A written document paired with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    /// The document exactly as it was written.
    pub document: Document,
    /// What the destination said about it.
    pub outcome: Outcome,
}

/// A document the destination refused, kept for the final report.
///
/// Serializes as the document itself (`_index`, `_type`, `_id`, `_source`)
/// plus a `reason` field, so auto-id documents stay identifiable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDocument {
    /// The rejected document, as it was sent.
    #[serde(flatten)]
    pub document: Document,
    /// Reason reported by the destination.
    pub reason: String,
}

impl FailedDocument {
    /// Builds a failure record, or `None` if the outcome was a success.
    pub fn from_outcome(outcome: &DocumentOutcome) -> Option<Self> {
        match &outcome.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed(reason) => Some(Self {
                document: outcome.document.clone(),
                reason: reason.clone(),
            }),
        }
    }
}
