use crate::feed::parser::{parse_feed, ParsedFeed};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that end a fetch cycle.
///
/// None of these are retried here; the poller skips the cycle and tries again
/// on its next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Retrieval did not finish within the fetch timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Feed could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Downloads and parses the feed at `url`, giving up after `timeout`.
///
/// The deadline covers the request and the body read. When it fires the
/// in-flight request future is dropped, which closes its connection.
pub async fn retrieve(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<ParsedFeed, FetchError> {
    let bytes = tokio::time::timeout(timeout, download(client, url))
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
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
