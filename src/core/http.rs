// ─── HTTP ───
// Transport seam used by the catalog, the downloader and the runtime
// provisioner, plus the bounded-retry metadata fetch.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

pub const APP_USER_AGENT: &str = concat!("server-installer/", env!("CARGO_PKG_VERSION"));

/// Bound on establishing a connection. Streaming bodies are bounded per
/// chunk by the downloader.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type ChunkStream = Pin<Box<dyn Stream<Item = LauncherResult<Vec<u8>>> + Send>>;

/// Streaming response body.
pub struct ResponseBody {
    /// `Content-Length`, when the server sent one.
    pub content_length: Option<u64>,
    pub chunks: ChunkStream,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` and return the body as text. Non-2xx is an error.
    async fn get_text(&self, url: &str, timeout: Duration) -> LauncherResult<String>;

    /// GET `url` and return the body as a chunk stream. Non-2xx is an error.
    async fn get_stream(&self, url: &str, headers: &[(String, String)])
        -> LauncherResult<ResponseBody>;
}

pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(user_agent)
        .default_headers(default_headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}

/// `HttpTransport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> LauncherResult<Self> {
        Ok(Self {
            client: build_http_client(user_agent)?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_text(&self, url: &str, timeout: Duration) -> LauncherResult<String> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    async fn get_stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> LauncherResult<ResponseBody> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LauncherError::Other(format!("invalid header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| LauncherError::Other(format!("invalid header value: {e}")))?;
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LauncherError::from))
            .boxed();

        Ok(ResponseBody {
            content_length,
            chunks,
        })
    }
}

// ── Metadata retry ──────────────────────────────────────

/// Bounded linear-backoff retry for small metadata requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before retry `n` is `n * initial_backoff_ms`.
    pub initial_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff_ms: 1000,
            timeout_secs: 8,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(u64::from(failed_attempt)))
    }
}

/// Every attempt of a metadata fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchExhausted {
    pub url: String,
    pub attempts: u32,
    pub last_error: String,
    /// HTTP status of the last attempt, when the server answered.
    pub status: Option<u16>,
}

impl FetchExhausted {
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// 4xx answers other than timeout and rate limiting will not change on retry.
fn is_permanent(err: &LauncherError) -> bool {
    match err {
        LauncherError::DownloadFailed { status, .. } => {
            (400..500).contains(status) && *status != 408 && *status != 429
        }
        _ => false,
    }
}

impl std::fmt::Display for FetchExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.url, self.attempts, self.last_error
        )
    }
}

/// GET + decode JSON, retrying transport and decode failures. Permanent
/// client errors end the loop on the first attempt.
pub async fn fetch_json_with_retry<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    url: &str,
    policy: &RetryPolicy,
) -> Result<T, FetchExhausted> {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();
    let mut status = None;
    let mut tried = 0;

    for attempt in 1..=attempts {
        tried = attempt;
        let outcome = match transport.get_text(url, policy.timeout()).await {
            Ok(body) => serde_json::from_str::<T>(&body).map_err(LauncherError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(value) => {
                debug!("Fetched {} on attempt {}", url, attempt);
                return Ok(value);
            }
            Err(err) => {
                last_error = err.to_string();
                status = match &err {
                    LauncherError::DownloadFailed { status, .. } => Some(*status),
                    _ => None,
                };
                if is_permanent(&err) {
                    break;
                }
                if attempt < attempts {
                    debug!("Attempt {} for {} failed: {}", attempt, url, last_error);
                    tokio::time::sleep(policy.backoff(attempt)).await;
                }
            }
        }
    }

    warn!("API request failed: {} ({})", url, last_error);
    Err(FetchExhausted {
        url: url.to_string(),
        attempts: tried,
        last_error,
        status,
    })
}
