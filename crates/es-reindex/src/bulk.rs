//! Bulk write wire format and transport.
//!
//! A batch is sent as newline-delimited JSON: one `index` action line per
//! document followed by its `_source` payload. The response carries one item
//! per action, and items are matched to documents by position only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::{normalize_endpoint, DestinationConfig};
use crate::connectors::common::{apply_auth, create_http_client, endpoint, error_from_response};
use crate::document::{Document, DocumentOutcome, Outcome};
use crate::error::{Error, Result};

#[derive(Serialize)]
struct ActionLine<'a> {
    index: ActionMeta<'a>,
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

/// Serializes documents into a bulk request body.
///
/// # Errors
///
/// Returns a JSON error if a payload cannot be serialized.
pub fn encode_bulk_body(documents: &[Document]) -> Result<String> {
    let mut body = String::with_capacity(documents.len() * 128);
    for doc in documents {
        let action = ActionLine {
            index: ActionMeta {
                index: &doc.index,
                doc_type: doc.doc_type.as_deref(),
                id: doc.id.as_deref(),
            },
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.source)?);
        body.push('\n');
    }
    Ok(body)
}

/// Per-action entry of a bulk response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BulkItemResult {
    /// Index the destination wrote to.
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    /// Id the destination assigned or echoed.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// HTTP-like status for this action.
    #[serde(default)]
    pub status: Option<u16>,
    /// Legacy success flag.
    #[serde(default)]
    pub ok: Option<bool>,
    /// Error detail, a string or an object with `type` and `reason`.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl BulkItemResult {
    /// Interprets this entry as a document outcome.
    pub fn outcome(&self) -> Outcome {
        if let Some(error) = &self.error {
            return Outcome::Failed(describe_error(error));
        }
        if self.ok == Some(false) {
            return Outcome::Failed("destination reported ok=false".to_string());
        }
        let status_ok = self.status.is_some_and(|s| (200..300).contains(&s));
        if status_ok || self.ok == Some(true) {
            return Outcome::Succeeded;
        }
        match self.status {
            Some(status) => Outcome::Failed(format!("status {status}")),
            None => Outcome::Failed("no status reported".to_string()),
        }
    }
}

fn describe_error(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            let kind = map.get("type").and_then(|v| v.as_str());
            let reason = map.get("reason").and_then(|v| v.as_str());
            match (kind, reason) {
                (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
                (None, Some(reason)) => reason.to_string(),
                (Some(kind), None) => kind.to_string(),
                (None, None) => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// Parsed bulk response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// Server-side processing time in milliseconds.
    pub took: u64,
    /// Whether the server flagged any item as failed.
    pub errors: bool,
    /// One entry per submitted action, in submission order.
    pub items: Vec<BulkItemResult>,
}

#[derive(Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    items: Option<Vec<HashMap<String, BulkItemResult>>>,
}

impl BulkResponse {
    /// Parses a bulk response body.
    ///
    /// # Errors
    ///
    /// `Protocol` if the body is not JSON, has no `items` array, or an item
    /// is not a single-action object.
    pub fn parse(body: &str) -> Result<Self> {
        let raw: RawBulkResponse = serde_json::from_str(body)
            .map_err(|e| Error::Protocol(format!("malformed bulk response: {e}")))?;
        let raw_items = raw
            .items
            .ok_or_else(|| Error::Protocol("bulk response has no 'items' array".to_string()))?;

        let mut items = Vec::with_capacity(raw_items.len());
        for (position, item) in raw_items.into_iter().enumerate() {
            let mut entries = item.into_values();
            match (entries.next(), entries.next()) {
                (Some(result), None) => items.push(result),
                _ => {
                    return Err(Error::Protocol(format!(
                        "bulk response item {position} is not a single action"
                    )))
                }
            }
        }

        Ok(Self {
            took: raw.took,
            errors: raw.errors,
            items,
        })
    }

    /// Pairs each submitted document with the item at the same position.
    ///
    /// The destination's id echo is not used: auto-generated ids cannot be
    /// matched. A reordered response silently misattributes outcomes.
    ///
    /// # Errors
    ///
    /// `Protocol` if the item count differs from the document count.
    pub fn correlate(self, documents: Vec<Document>) -> Result<Vec<DocumentOutcome>> {
        if self.items.len() != documents.len() {
            return Err(Error::Protocol(format!(
                "bulk response has {} items for {} documents",
                self.items.len(),
                documents.len()
            )));
        }

        Ok(documents
            .into_iter()
            .zip(self.items)
            .map(|(document, item)| DocumentOutcome {
                document,
                outcome: item.outcome(),
            })
            .collect())
    }
}

/// Something that can execute one bulk request.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Sends an encoded bulk body and returns the parsed response.
    ///
    /// A per-document rejection is reported inside the response. `Err` means
    /// the whole request failed.
    async fn send_bulk(&self, body: String) -> Result<BulkResponse>;
}

/// `POST /_bulk` over HTTP.
pub struct HttpBulkClient {
    client: reqwest::Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpBulkClient {
    /// Creates a client for the destination, with its timeout applied per request.
    ///
    /// # Errors
    ///
    /// `Config` if the destination URL is invalid.
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        let base = normalize_endpoint(&config.url)?;
        Ok(Self {
            client: create_http_client(config.timeout())?,
            url: endpoint(&base, "_bulk"),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Full URL of the bulk endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BulkTransport for HttpBulkClient {
    async fn send_bulk(&self, body: String) -> Result<BulkResponse> {
        let req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let req = apply_auth(req, self.username.as_deref(), self.password.as_deref());

        let response = req
            .send()
            .await
            .map_err(|e| Error::from_reqwest("bulk", &e))?;
        if !response.status().is_success() {
            return Err(error_from_response(response, "bulk").await);
        }
        let text = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest("bulk", &e))?;

        let parsed = BulkResponse::parse(&text)?;
        debug!(
            "Bulk response: {} items in {}ms (errors: {})",
            parsed.items.len(),
            parsed.took,
            parsed.errors
        );
        Ok(parsed)
    }
}

#[cfg(test)]
#[path = "bulk_tests.rs"]
mod tests;
