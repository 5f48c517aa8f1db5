//! Common utilities shared by the scroll cursor and the bulk client.
//!
//! HTTP client creation, authentication, URL building and mapping of
//! non-success responses to errors.

use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use std::time::Duration;

/// Default response timeout for source and destination requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for all requests.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Creates a configured HTTP client with the given response timeout.
///
/// # Errors
///
/// Returns a transport error if the TLS backend cannot be initialized.
pub fn create_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Transport(format!("Cannot build HTTP client: {e}")))
}

/// Applies Basic auth when both parts are present.
pub fn apply_auth(
    req: RequestBuilder,
    username: Option<&str>,
    password: Option<&str>,
) -> RequestBuilder {
    match (username, password) {
        (Some(user), pass) => req.basic_auth(user, pass),
        _ => req,
    }
}

/// Appends `path` to the base URL, keeping any path prefix the base has
/// (for clusters served behind a proxy sub-path).
pub fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Maps a non-success HTTP response to an error.
pub fn handle_http_error(status: StatusCode, body: &str, context: &str) -> Error {
    let body = truncate(body);
    match status.as_u16() {
        401 | 403 => Error::Authentication(format!("{context} HTTP {status}: {body}")),
        code => Error::HttpStatus {
            context: context.to_string(),
            status: code,
            body: body.to_string(),
        },
    }
}

/// Reads the body of a failed response and turns it into an error.
pub async fn error_from_response(response: reqwest::Response, context: &str) -> Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    handle_http_error(status, &body, context)
}

fn truncate(body: &str) -> &str {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
