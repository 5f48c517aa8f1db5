//! Scroll cursor over a search index.
//!
//! The cursor opens a scroll search, then advances it page by page until the
//! server returns an empty page. The declared `hits.total` is only an
//! estimate and is never used to decide when to stop.

use async_trait::async_trait;
use futures::Stream;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{normalize_endpoint, SourceConfig};
use crate::connectors::common::{
    apply_auth, create_http_client, endpoint, error_from_response, DEFAULT_TIMEOUT,
};
use crate::connectors::DocumentSource;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};

/// Server-side cursor handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollState {
    /// Opaque token for the next page. May change after every page.
    pub scroll_id: String,
    /// Result-set size declared when the scroll was opened.
    pub total: u64,
    /// Documents requested per page.
    pub page_size: usize,
}

/// Response body of both the opening search and every scroll advance.
#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Option<HitsContainer>,
}

#[derive(Debug, Deserialize)]
struct HitsContainer {
    total: Option<TotalHits>,
    hits: Option<Vec<Document>>,
}

/// `hits.total` is a plain number on older engines and `{"value": n}` on
/// newer ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            Self::Count(n) | Self::Object { value: n } => *n,
        }
    }
}

/// One parsed page.
#[derive(Debug)]
struct ScrollPage {
    scroll_id: Option<String>,
    total: Option<u64>,
    documents: Vec<Document>,
}

fn parse_page(body: &str, context: &str) -> Result<ScrollPage> {
    let response: ScrollResponse = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("{context}: malformed response: {e}")))?;

    let hits = response
        .hits
        .ok_or_else(|| Error::Protocol(format!("{context}: response has no 'hits' object")))?;
    let documents = hits
        .hits
        .ok_or_else(|| Error::Protocol(format!("{context}: response has no 'hits.hits' array")))?;

    Ok(ScrollPage {
        scroll_id: response.scroll_id,
        total: hits.total.map(|t| t.value()),
        documents,
    })
}

/// Paginated reader over one index and one query.
pub struct ScrollCursor {
    config: SourceConfig,
    base: Url,
    client: Client,
    retry: RetryConfig,
    state: Option<ScrollState>,
    total: u64,
    buffer: VecDeque<Document>,
    advances: u64,
    emitted: u64,
    exhausted: bool,
}

impl ScrollCursor {
    /// Opens the scroll and buffers the first page.
    ///
    /// # Errors
    ///
    /// `Transport` on connection or HTTP failure, `Protocol` if the response
    /// lacks `_scroll_id` or `hits.total`.
    pub async fn open(config: SourceConfig, retry: RetryConfig) -> Result<Self> {
        let base = normalize_endpoint(&config.url)?;
        let client = create_http_client(DEFAULT_TIMEOUT)?;

        let mut cursor = Self {
            config,
            base,
            client,
            retry,
            state: None,
            total: 0,
            buffer: VecDeque::new(),
            advances: 0,
            emitted: 0,
            exhausted: false,
        };

        let (state, first_page) = cursor.request_open().await?;
        info!(
            "Opened scroll on '{}' ({} documents declared, {} per page)",
            cursor.config.index, state.total, state.page_size
        );
        cursor.total = state.total;
        cursor.state = Some(state);
        cursor.buffer.extend(first_page);

        Ok(cursor)
    }

    /// Builds the URL of the opening search request.
    fn build_open_url(&self) -> Result<Url> {
        let url = endpoint(&self.base, &format!("{}/_search", self.config.index));
        let mut url =
            Url::parse(&url).map_err(|e| Error::Config(format!("Invalid search URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(search_type) = &self.config.search_type {
                query.append_pair("search_type", search_type);
            }
            query.append_pair("scroll", &self.config.scroll);
            query.append_pair("size", &self.config.page_size.to_string());
        }
        Ok(url)
    }

    /// Builds the body of the opening search request.
    fn build_open_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({ "query": self.config.effective_query() });
        if self.config.search_type.is_none() {
            // Without scan, index order is the cheapest order to page through.
            body["sort"] = serde_json::json!(["_doc"]);
        }
        body
    }

    async fn request_open(&self) -> Result<(ScrollState, Vec<Document>)> {
        let url = self.build_open_url()?;
        let req = self.client.post(url).json(&self.build_open_body());
        let req = apply_auth(
            req,
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        );

        let response = req
            .send()
            .await
            .map_err(|e| Error::from_reqwest("scroll open", &e))?;
        if !response.status().is_success() {
            return Err(error_from_response(response, "scroll open").await);
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest("scroll open", &e))?;

        let page = parse_page(&body, "scroll open")?;
        let scroll_id = page
            .scroll_id
            .ok_or_else(|| Error::Protocol("scroll open: response has no _scroll_id".to_string()))?;
        let total = page
            .total
            .ok_or_else(|| Error::Protocol("scroll open: response has no hits.total".to_string()))?;

        Ok((
            ScrollState {
                scroll_id,
                total,
                page_size: self.config.page_size,
            },
            page.documents,
        ))
    }

    async fn fetch_page(&self, scroll_id: &str) -> Result<ScrollPage> {
        let url = endpoint(&self.base, "_search/scroll");
        let req = self
            .client
            .get(url)
            .query(&[("scroll", self.config.scroll.as_str()), ("scroll_id", scroll_id)]);
        let req = apply_auth(
            req,
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        );

        let response = req
            .send()
            .await
            .map_err(|e| Error::from_reqwest("scroll advance", &e))?;
        if !response.status().is_success() {
            return Err(error_from_response(response, "scroll advance").await);
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest("scroll advance", &e))?;

        parse_page(&body, "scroll advance")
    }

    /// Fetches the next page.
    ///
    /// Waits `delay_ms` first, except before the very first advance. An
    /// empty page exhausts the cursor; advancing an exhausted cursor returns
    /// an empty page without touching the network.
    ///
    /// # Errors
    ///
    /// `Transport` or `Protocol`; both end the stream.
    pub async fn advance(&mut self) -> Result<Vec<Document>> {
        let token = match &self.state {
            Some(state) if !self.exhausted => state.scroll_id.clone(),
            _ => return Ok(Vec::new()),
        };

        if self.advances > 0 && self.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }
        self.advances += 1;

        let this = &*self;
        let token_ref = token.as_str();
        let result = with_retry(&this.retry, "scroll advance", move || {
            this.fetch_page(token_ref)
        })
        .await;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.state = None;
                self.exhausted = true;
                return Err(e);
            }
        };

        debug!(
            "Scroll page {}: {} documents",
            self.advances,
            page.documents.len()
        );

        if let (Some(state), Some(next)) = (self.state.as_mut(), page.scroll_id) {
            state.scroll_id = next;
        }

        if Self::is_exhausted(&page.documents) {
            info!(
                "Scroll exhausted after {} pages ({} documents emitted)",
                self.advances, self.emitted
            );
            self.exhausted = true;
            self.clear().await;
        }

        Ok(page.documents)
    }

    /// A page with zero documents ends the scroll.
    #[must_use]
    pub fn is_exhausted(page: &[Document]) -> bool {
        page.is_empty()
    }

    /// Next document in server order, `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`advance`](Self::advance).
    pub async fn next_document(&mut self) -> Result<Option<Document>> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                self.emitted += 1;
                return Ok(Some(doc));
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = self.advance().await?;
            self.buffer.extend(page);
        }
    }

    /// Adapts the cursor into a `Stream` of documents.
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> {
        futures::stream::try_unfold(self, |mut cursor| async move {
            let next = cursor.next_document().await?;
            Ok::<_, Error>(next.map(|doc| (doc, cursor)))
        })
    }

    /// Declared result-set size.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Current cursor state, `None` once exhausted or failed.
    pub fn state(&self) -> Option<&ScrollState> {
        self.state.as_ref()
    }

    /// Documents handed out so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Releases the server-side scroll context. Failures are only logged.
    pub async fn clear(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        let url = endpoint(&self.base, "_search/scroll");
        let req = self
            .client
            .delete(url)
            .json(&serde_json::json!({ "scroll_id": [state.scroll_id] }));
        let req = apply_auth(
            req,
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        );

        match req.send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Cleared scroll context");
            }
            Ok(response) => warn!("Clearing scroll returned HTTP {}", response.status()),
            Err(e) => warn!("Clearing scroll failed: {}", e),
        }
    }
}

#[async_trait]
impl DocumentSource for ScrollCursor {
    fn source_type(&self) -> &'static str {
        "scroll"
    }

    fn total_hint(&self) -> Option<u64> {
        Some(self.total)
    }

    async fn next_document(&mut self) -> Result<Option<Document>> {
        ScrollCursor::next_document(self).await
    }

    async fn close(&mut self) -> Result<()> {
        self.exhausted = true;
        self.buffer.clear();
        self.clear().await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "scroll_tests.rs"]
mod tests;
