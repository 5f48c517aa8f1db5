//! Configuration types for es-reindex.
//!
//! A migration is described once and stays immutable for the whole run. It
//! can come from a YAML file or be assembled from command-line flags.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};
use crate::retry::RetryConfig;

/// Port assumed when a bare host name is given.
pub const DEFAULT_PORT: u16 = 9200;

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Cluster and index to export from.
    pub source: SourceConfig,
    /// Cluster to re-index into. `None` means export-only.
    #[serde(default)]
    pub destination: Option<DestinationConfig>,
    /// File to archive the exported documents to.
    #[serde(default)]
    pub output: Option<OutputConfig>,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Source cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source endpoint (`host`, `host:port` or full URL).
    pub url: String,
    /// Index to export.
    pub index: String,
    /// Query DSL filter. `None` exports everything.
    #[serde(default)]
    pub query: Option<serde_json::Value>,
    /// Documents requested per scroll page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pause before each scroll advance after the first, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Scroll keep-alive passed to the server.
    #[serde(default = "default_scroll")]
    pub scroll: String,
    /// `search_type` for the opening request. `null` omits the parameter.
    #[serde(default = "default_search_type")]
    pub search_type: Option<String>,
    /// Optional username for Basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for Basic auth.
    #[serde(default)]
    pub password: Option<String>,
}

/// Destination cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination endpoint (`host`, `host:port` or full URL).
    pub url: String,
    /// Documents per bulk request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Response timeout for one bulk request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Index name every document is written to instead of its own.
    #[serde(default)]
    pub rename: Option<String>,
    /// Optional username for Basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for Basic auth.
    #[serde(default)]
    pub password: Option<String>,
}

/// JSON-lines archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File to write.
    pub path: PathBuf,
    /// Force gzip compression. A `.gz` suffix enables it too.
    #[serde(default)]
    pub gzip: bool,
}

impl OutputConfig {
    /// Whether the file should be gzip-compressed.
    #[must_use]
    pub fn is_gzip(&self) -> bool {
        self.gzip || has_gz_extension(&self.path)
    }
}

/// Migration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Hide progress bars.
    #[serde(default)]
    pub quiet: bool,
    /// Retry policy for scroll advances and bulk flushes.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Serializable retry policy. Zero retries keeps every transport error fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound for the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    /// Converts to the runtime retry policy.
    pub fn to_retry_config(&self) -> RetryConfig {
        if self.max_retries == 0 {
            return RetryConfig::no_retry();
        }
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

fn default_page_size() -> usize {
    1000
}

fn default_batch_size() -> usize {
    1000
}

fn default_delay_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_scroll() -> String {
    "5m".to_string()
}

fn default_search_type() -> Option<String> {
    Some("scan".to_string())
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

pub(crate) fn has_gz_extension(path: &std::path::Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

impl SourceConfig {
    /// Creates a source with default paging for `index` on `url`.
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            query: None,
            page_size: default_page_size(),
            delay_ms: default_delay_ms(),
            scroll: default_scroll(),
            search_type: default_search_type(),
            username: None,
            password: None,
        }
    }

    /// The query actually sent: the configured one or `match_all`.
    pub fn effective_query(&self) -> serde_json::Value {
        self.query
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "match_all": {} }))
    }
}

impl DestinationConfig {
    /// Creates a destination with default batching for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            rename: None,
            username: None,
            password: None,
        }
    }

    /// Per-flush response timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Turns `host`, `host:port` or a full URL into a base URL.
///
/// A bare host gets `http://` and port 9200. An explicit scheme keeps its
/// default port.
pub fn normalize_endpoint(host: &str) -> Result<reqwest::Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::Config("endpoint cannot be empty".to_string()));
    }

    let has_scheme = host.contains("://");
    let raw = if has_scheme {
        host.to_string()
    } else {
        format!("http://{host}")
    };

    let mut url = reqwest::Url::parse(&raw)
        .map_err(|e| Error::Config(format!("Invalid endpoint '{host}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{host}'. Allowed: http, https"
        )));
    }

    if !has_scheme && url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|()| Error::Config(format!("Cannot set port on '{host}'")))?;
    }

    Ok(url)
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.source.index.trim().is_empty() {
            return Err(Error::Config("source index cannot be empty".to_string()));
        }
        if self.source.page_size == 0 {
            return Err(Error::Config(
                "page_size must be greater than 0".to_string(),
            ));
        }
        normalize_endpoint(&self.source.url)?;

        if let Some(dest) = &self.destination {
            normalize_endpoint(&dest.url)?;
            if dest.batch_size == 0 {
                return Err(Error::Config(
                    "batch_size must be greater than 0".to_string(),
                ));
            }
            if dest.timeout_secs == 0 {
                return Err(Error::Config(
                    "timeout_secs must be greater than 0".to_string(),
                ));
            }
            if dest.rename.as_deref().is_some_and(|r| r.trim().is_empty()) {
                return Err(Error::Config("rename target cannot be empty".to_string()));
            }
        }

        if self.destination.is_none() && self.output.is_none() {
            warn!("No destination and no output file: documents are only counted");
        }

        Ok(())
    }
}

/// Example configuration written by `es-reindex init`.
pub const EXAMPLE_CONFIG: &str = r#"# es-reindex migration configuration
source:
  url: http://localhost:9200
  index: products
  # query:
  #   term:
  #     active: true
  page_size: 1000
  delay_ms: 100
  scroll: 5m
  search_type: scan

destination:
  url: http://localhost:9201
  batch_size: 1000
  timeout_secs: 30
  # rename: products-v2

# output:
#   path: ./products.jsonl.gz

options:
  quiet: false
  retry:
    max_retries: 0
"#;
