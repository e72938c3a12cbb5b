use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use thiserror::Error;
use url::Url;

use crate::util::{validate_url, UrlValidationError};

/// `Accept` header sent with the feed request.
pub const FEED_ACCEPT: &str = "application/rss+xml, application/xml;q=0.9, text/xml;q=0.8";

/// Errors that can occur while retrieving the feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The whole exchange exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed URL is malformed or not http/https
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Response is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Fetches the raw feed document.
///
/// Sends exactly one GET. `timeout` covers connect, headers and body; when
/// it expires the request future is dropped, which aborts the connection.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<String, FetchError> {
    let url = validate_url(url)?;

    let bytes = tokio::time::timeout(timeout, fetch_bytes(client, url, max_bytes))
        .await
        .map_err(|_| FetchError::Timeout)??;

    let text = std::str::from_utf8(&bytes)?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

async fn fetch_bytes(
    client: &reqwest::Client,
    url: Url,
    max_bytes: usize,
) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).header(ACCEPT, FEED_ACCEPT).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    read_limited_bytes(response, max_bytes).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: reject on Content-Length before reading anything
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::with_capacity(expected_length.unwrap_or(0) as usize);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
