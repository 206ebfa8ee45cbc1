use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_document, ParseError, ParsedFeedDocument};

/// Value of the `User-Agent` header sent with every feed request.
pub const CLIENT_IDENTIFIER: &str = "gator";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 10;

/// Errors that can occur while fetching a single feed.
///
/// None of these are retried here; the caller decides what a failure means.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL was empty or not absolute
    #[error("Invalid feed URL: {0:?}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request plus body read exceeded the caller's deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// HTTP response other than 200 OK
    #[error("Unexpected status code: {0}")]
    BadStatus(u16),
    /// Body was not a well-formed feed document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Source of parsed feed documents.
///
/// The ingestion loop only talks to this trait so that it can run against
/// canned documents in tests.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetches and parses the feed at `url`, giving up after `deadline`.
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<ParsedFeedDocument, FetchError>;
}

/// [`FeedFetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher with its own connection pool.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps a caller-configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, CLIENT_IDENTIFIER)
            .send()
            .await?;

        let status = response.status();
        // The body is drained before the status is judged so the connection
        // can go back to the pool.
        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

        if status != StatusCode::OK {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        Ok(bytes)
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<ParsedFeedDocument, FetchError> {
        if url.trim().is_empty() || url::Url::parse(url).is_err() {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        tracing::info!(url = %url, "Fetching feed");

        let bytes = tokio::time::timeout(deadline, self.fetch_body(url))
            .await
            .map_err(|_| FetchError::Timeout(deadline))??;

        let document = parse_document(&bytes)?;
        tracing::debug!(
            url = %url,
            title = %document.title,
            items = document.items.len(),
            "Parsed feed"
        );
        Ok(document)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
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
