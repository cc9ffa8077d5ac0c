//! HTTP retry helpers for transient errors.
//!
//! Every upstream request goes through [`send_text`] or [`send_json`]
//! instead of calling `reqwest::RequestBuilder::send()` directly, so
//! connection failures, timeouts, rate limiting and server errors get
//! retried with exponential backoff. The caller's per-source timeout bounds
//! the total time spent here.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::SourceError;

/// How many times a request is retried and how long to wait in between.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^n`, so the
/// default gives 2s, 4s, 8s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit for the exponential backoff.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt with no retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay: Duration::ZERO,
    };

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_text_with(RetryPolicy::default(), build_request).await
}

/// [`send_text`] with an explicit retry policy.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_text_with<F>(policy: RetryPolicy, build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, policy).await?;
    response
        .text()
        .await
        .map_err(|e| SourceError::Http(e.without_url()))
}

/// Sends an HTTP request with `policy` and parses the response body as
/// JSON.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries or the
/// body is not valid JSON for `T`.
#[allow(clippy::future_not_send)]
pub async fn send_json<T, F>(policy: RetryPolicy, build_request: F) -> Result<T, SourceError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let text = send_text_with(policy, build_request).await?;
    serde_json::from_str(&text).map_err(|e| {
        log::warn!("JSON parse failed: {e}\n  body preview: {}", preview(&text));
        SourceError::Json(e)
    })
}

/// Returns at most [`BODY_PREVIEW_LEN`] characters of `text` for logging.
#[must_use]
pub fn preview(text: &str) -> String {
    if text.chars().count() > BODY_PREVIEW_LEN {
        let cut: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Core retry loop shared by [`send_text`] and [`send_json`].
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: RetryPolicy,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                let e = e.without_url();
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if is_retryable_status(status) {
                    let err = SourceError::Status {
                        status,
                        url: redact(response.url()),
                    };
                    if attempt < max_retries {
                        log::warn!("  {err}");
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }

                // 4xx other than 429 is permanent.
                if status.is_client_error() {
                    return Err(SourceError::Status {
                        status,
                        url: redact(response.url()),
                    });
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Malformed {
        message: "request failed after all retries".to_string(),
    }))
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// 429 and 5xx are retried; everything else is final.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Strips path segments and query parameters that may carry API keys.
///
/// FIRMS embeds the map key as a path segment, so only scheme and host are
/// kept.
#[must_use]
pub fn redact(url: &reqwest::Url) -> String {
    format!("{}://{}/...", url.scheme(), url.host_str().unwrap_or("?"))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{Read as _, Write as _};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Local HTTP server answering each connection with the next scripted
    /// `(status, body)`, repeating the last one. Returns its base URL and a
    /// request counter.
    pub fn scripted_server(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                read_request(&mut stream);
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];
                let reply = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        (format!("http://{addr}"), hits)
    }

    /// Local server that accepts connections and never answers.
    pub fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        format!("http://{addr}")
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn default_policy_backs_off_two_four_eight_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        let delays: Vec<Duration> = (1..=3).map(|a| policy.delay(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[tokio::test]
    async fn server_error_then_success_is_retried() {
        let (url, hits) = scripted_server(vec![(503, "busy"), (200, "ok")]);
        let client = reqwest::Client::new();

        let body = send_text_with(fast_policy(), || client.get(&url)).await.unwrap();

        assert_eq!(body, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let (url, hits) = scripted_server(vec![(429, "slow down"), (429, "slow down"), (200, "ok")]);
        let client = reqwest::Client::new();

        let body = send_text_with(fast_policy(), || client.get(&url)).await.unwrap();

        assert_eq!(body, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let (url, hits) = scripted_server(vec![(403, "forbidden"), (200, "ok")]);
        let client = reqwest::Client::new();

        let result = send_text_with(fast_policy(), || client.get(&url)).await;

        assert!(matches!(
            result,
            Err(SourceError::Status { status, .. }) if status == reqwest::StatusCode::FORBIDDEN
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (url, hits) = scripted_server(vec![(502, "bad gateway")]);
        let client = reqwest::Client::new();

        let result = send_text_with(fast_policy(), || client.get(&url)).await;

        assert!(matches!(
            result,
            Err(SourceError::Status { status, .. }) if status == reqwest::StatusCode::BAD_GATEWAY
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn no_retry_policy_makes_one_attempt() {
        let (url, hits) = scripted_server(vec![(503, "busy"), (200, "ok")]);
        let client = reqwest::Client::new();

        let result = send_text_with(RetryPolicy::NONE, || client.get(&url)).await;

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_rate_limit_and_server_errors_only() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(reqwest::StatusCode::OK));
    }

    #[test]
    fn redacts_map_key_from_url() {
        let url = reqwest::Url::parse(
            "https://firms.modaps.eosdis.nasa.gov/api/area/csv/SECRETKEY/MODIS_NRT/1,2,3,4/1",
        )
        .unwrap();
        let redacted = redact(&url);
        assert_eq!(redacted, "https://firms.modaps.eosdis.nasa.gov/...");
        assert!(!redacted.contains("SECRETKEY"));
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let p = preview(&body);
        assert_eq!(p.len(), BODY_PREVIEW_LEN + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
