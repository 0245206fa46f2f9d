use crate::feed::parser::parse_feed;
use crate::storage::{Database, DatabaseError, SyncTarget};
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while syncing one channel.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Storing the articles failed
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Fewer bytes arrived than Content-Length promised
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Knobs for one HTTP fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries for 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub backoff_base: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// HTTP client shared by every sync: bounded redirects, pooled connections.
pub fn build_client(options: &FetchOptions) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("feedlist/", env!("CARGO_PKG_VERSION")))
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(options.timeout)
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Fetch, parse and store one channel's feed.
///
/// Returns the number of new articles. The outcome is recorded on the
/// channel row: success clears its error, failure stores the message
/// (best effort; a failure to record is only logged).
pub async fn sync_target(
    db: &Database,
    client: &reqwest::Client,
    target: &SyncTarget,
    options: FetchOptions,
) -> Result<usize, FetchError> {
    let result = fetch_and_store(db, client, target, options).await;

    if let Err(e) = &result {
        if let Err(db_err) = db.set_channel_error(&target.uuid, Some(&e.to_string())).await {
            tracing::warn!(
                uuid = %target.uuid,
                error = %db_err,
                "Failed to record channel sync error"
            );
        }
    }

    result
}

async fn fetch_and_store(
    db: &Database,
    client: &reqwest::Client,
    target: &SyncTarget,
    options: FetchOptions,
) -> Result<usize, FetchError> {
    let bytes = fetch_bytes(client, &target.feed_url, options).await?;
    let articles = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    let inserted = db.complete_channel_sync(&target.uuid, &articles).await?;

    tracing::debug!(
        uuid = %target.uuid,
        title = %target.title,
        parsed = articles.len(),
        inserted,
        "Channel synced"
    );
    Ok(inserted)
}

async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    options: FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let mut retry_count = 0;

    loop {
        let delay = options.backoff_base * 2u32.saturating_pow(retry_count);

        let response = tokio::time::timeout(options.timeout, client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if retry_count >= options.max_retries {
                return Err(if status.is_server_error() {
                    FetchError::HttpStatus(status.as_u16())
                } else {
                    FetchError::RateLimited(options.max_retries)
                });
            }

            tracing::warn!(
                feed = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        // 4xx fails immediately
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => return Ok(bytes),
            Err(FetchError::IncompleteResponse { expected, received })
                if retry_count < options.max_retries =>
            {
                tracing::debug!(
                    feed = %url,
                    expected,
                    received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if expected_length.is_some_and(|len| len as usize > limit) {
        return Err(FetchError::ResponseTooLarge);
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
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
