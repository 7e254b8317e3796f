//! HTTP fetch facade over a shared tokio runtime.
//!
//! Workers are plain threads; all network I/O goes through one async
//! reqwest client driven by `block_on`, with a per-call deadline.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

/// Connect timeout for the shared client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("litkeep/", env!("CARGO_PKG_VERSION"));

/// Runtime-tunable HTTP settings (set once at startup from config/CLI).
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Per-attempt deadline, covering connect + full body read.
    pub timeout: Duration,
    /// Max transient-error retries inside a single attempt.
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

static CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP settings. Later calls are ignored (first writer wins).
pub fn set_http_config(config: HttpConfig) {
    let _ = CONFIG.set(config);
}

pub fn http_config() -> HttpConfig {
    CONFIG.get().copied().unwrap_or_default()
}

/// Error from a single HTTP fetch.
#[derive(Debug)]
pub enum HttpError {
    /// Non-success status code.
    Status { status: u16, message: String },
    /// Connection / protocol failure without a status.
    Transport(String),
    /// Per-attempt deadline exceeded.
    TimedOut,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::TimedOut => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    /// Build from a reqwest error, stripping the URL to avoid leaking
    /// credentials embedded in query strings.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::TimedOut;
        }
        match e.status() {
            Some(s) => Self::Status {
                status: s.as_u16(),
                message: e.without_url().to_string(),
            },
            None => Self::Transport(e.without_url().to_string()),
        }
    }

    /// Rate limits, server errors, and network hiccups are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 429 | 500..=599),
            Self::Transport(_) | Self::TimedOut => true,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Raw fetch result handed to payload verification.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchResponse {
    /// True when the payload is an HTML document rather than the
    /// requested artifact (paywall / landing page).
    pub fn looks_like_html(&self) -> bool {
        if let Some(ct) = &self.content_type {
            if ct.to_ascii_lowercase().contains("text/html") {
                return true;
            }
        }
        let head = &self.bytes[..self.bytes.len().min(256)];
        let head = String::from_utf8_lossy(head);
        let head = head.trim_start().to_ascii_lowercase();
        head.starts_with("<!doctype html") || head.starts_with("<html")
    }
}

/// Capability handle for raw byte fetches. The retrieval state machine
/// only sees this trait, so tests can substitute canned responses.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchResponse, HttpError>;
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Production [`Fetcher`]: GET with redirects, deadline, no retry.
///
/// Retry policy for artifact downloads lives in the retrieval chain
/// (next source in the chain is the fallback), not here.
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, HttpError> {
        let deadline = http_config().timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let fut = async {
                let resp = http_client()
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| HttpError::from_reqwest(e))?;
                let status = resp.status().as_u16();
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                if status >= 400 {
                    return Err(HttpError::Status {
                        status,
                        message: format!("GET returned {status}"),
                    });
                }
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| HttpError::from_reqwest(e))?;
                Ok(FetchResponse {
                    status,
                    content_type,
                    bytes: bytes.to_vec(),
                })
            };
            match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(HttpError::TimedOut),
            }
        })
    }
}

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// GET a text body with bounded retry on transient errors (429/5xx,
/// timeouts, transport failures). Used by the metadata API clients.
pub fn get_with_retry(url: &str, headers: &[(&str, &str)]) -> Result<String, HttpError> {
    let cfg = http_config();
    let mut attempt = 0u32;
    loop {
        let result: Result<String, HttpError> = SHARED_RUNTIME.handle().block_on(async {
            let fut = async {
                let mut req = http_client().get(url);
                for (name, value) in headers {
                    req = req.header(*name, *value);
                }
                let resp = req
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| HttpError::from_reqwest(e))?;
                resp.text().await.map_err(|e| HttpError::from_reqwest(e))
            };
            match tokio::time::timeout(cfg.timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(HttpError::TimedOut),
            }
        });

        match result {
            Ok(text) => return Ok(text),
            Err(e) if attempt < cfg.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff_duration(attempt);
                log::warn!("GET failed ({e}), retry {attempt}/{} in {delay:?}", cfg.max_retries);
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html_response(ct: Option<&str>, body: &[u8]) -> FetchResponse {
        FetchResponse {
            status: 200,
            content_type: ct.map(String::from),
            bytes: body.to_vec(),
        }
    }

    #[test]
    fn status_429_retryable() {
        let e = HttpError::Status {
            status: 429,
            message: "slow down".into(),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn status_404_not_retryable() {
        let e = HttpError::Status {
            status: 404,
            message: "missing".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn timeout_retryable() {
        assert!(HttpError::TimedOut.is_retryable());
    }

    #[test]
    fn html_by_content_type() {
        let r = html_response(Some("text/html; charset=utf-8"), b"%PDF-1.5");
        assert!(r.looks_like_html());
    }

    #[test]
    fn html_by_body_sniff() {
        let r = html_response(Some("application/pdf"), b"  <!DOCTYPE html><html>");
        assert!(r.looks_like_html());
        let r = html_response(None, b"<html lang=\"en\">");
        assert!(r.looks_like_html());
    }

    #[test]
    fn pdf_not_html() {
        let r = html_response(Some("application/pdf"), b"%PDF-1.7 ...");
        assert!(!r.looks_like_html());
    }

    #[test]
    fn backoff_exponential() {
        assert_eq!(backoff_duration(1), Duration::from_secs(2));
        assert_eq!(backoff_duration(2), Duration::from_secs(4));
        assert_eq!(backoff_duration(3), Duration::from_secs(8));
    }
}
