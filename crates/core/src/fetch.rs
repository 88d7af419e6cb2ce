//! Page fetching with per-site retry and backoff.
//!
//! The network sits behind the [`Transport`] trait. [`HttpTransport`] is the
//! reqwest-backed default; anything else (a recorded session, a test
//! double) can be plugged into a [`Fetcher`] instead.
//!
//! Retries are driven by a [`RetryPolicy`] value and the generic [`retry`]
//! combinator, so the backoff formula can be swapped and tested without a
//! network.

use std::fmt;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ExtractError, Result, TransportError};
use crate::profile::SiteProfile;

/// Desktop-browser User-Agent; many government sites reject anything else.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Parameters of one GET.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

/// Raw answer to one GET.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An HTTP GET capability.
pub trait Transport: Send + Sync {
    fn get(
        &self, url: &Url, request: &TransportRequest,
    ) -> impl Future<Output = std::result::Result<TransportResponse, TransportError>> + Send;
}

/// reqwest-backed [`Transport`].
#[cfg(feature = "fetch")]
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "fetch")]
impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, custom TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "fetch")]
impl Transport for HttpTransport {
    async fn get(
        &self, url: &Url, request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut builder = self.client.get(url.clone()).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() { TransportError::Timeout(request.timeout) } else { TransportError::Http(e) }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse { status, content_type, body })
    }
}

/// How many times to try and how long to wait between tries.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl RetryPolicy {
    /// `backoff(n)` is the wait after failed attempt `n` (1-based).
    pub fn new(max_attempts: u32, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self { max_attempts, backoff: Arc::new(backoff) }
    }

    /// Wait `n * step` after attempt `n`.
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::new(max_attempts, move |attempt| step.saturating_mul(attempt))
    }

    /// No wait between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, |_| Duration::ZERO)
    }

    /// Attempts to make; zero is treated as one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("first_delay", &self.delay_after(1))
            .finish()
    }
}

/// Outcome of [`retry`] and the number of attempts it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub outcome: std::result::Result<T, E>,
    pub attempts: u32,
}

/// Run `op` until it succeeds or the policy's attempts run out.
///
/// `op` receives the 1-based attempt number. Between failures the task
/// sleeps for [`RetryPolicy::delay_after`]; nothing runs concurrently.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Retried<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Retried { outcome: Ok(value), attempts: attempt },
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %e, "attempt failed, giving up");
                    return Retried { outcome: Err(e), attempts: attempt };
                }

                let delay = policy.delay_after(attempt);
                warn!(attempt, max_attempts, backoff_ms = delay.as_millis() as u64, error = %e, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Result of fetching one page.
#[derive(Debug)]
pub enum FetchResult {
    Success { html: String, attempts: u32 },
    Failure { error: ExtractError, attempts: u32 },
}

impl FetchResult {
    pub fn attempts(&self) -> u32 {
        match self {
            FetchResult::Success { attempts, .. } | FetchResult::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

/// Retrying page fetcher over a [`Transport`].
#[derive(Debug, Clone)]
pub struct Fetcher<T> {
    transport: T,
    user_agent: String,
    backoff_step: Duration,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, user_agent: BROWSER_USER_AGENT.to_string(), backoff_step: Duration::from_millis(2000) }
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `profile.max_retries` attempts with linear backoff.
    pub fn policy_for(&self, profile: &SiteProfile) -> RetryPolicy {
        RetryPolicy::linear(profile.max_retries, self.backoff_step)
    }

    /// Browser headers, overridden by the profile's own headers.
    pub fn request_for(&self, profile: &SiteProfile) -> TransportRequest {
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Accept".to_string(), ACCEPT.to_string()),
            ("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()),
        ];
        for (name, value) in &profile.http_headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        TransportRequest { timeout: profile.timeout(), headers }
    }

    /// GET `url` with the profile's timeout, retries and encoding.
    ///
    /// Any transport error or non-2xx status fails the attempt. When every
    /// attempt fails the result carries [`ExtractError::FetchExhausted`]
    /// with the last error's message.
    pub async fn fetch(&self, url: &Url, profile: &SiteProfile) -> FetchResult {
        let request = self.request_for(profile);
        let request = &request;
        let policy = self.policy_for(profile);

        let retried = retry(&policy, |attempt| async move {
            debug!(%url, attempt, "fetching");
            let response = self.transport.get(url, request).await?;
            if !response.is_success() {
                return Err(TransportError::Status(response.status));
            }
            Ok(decode_body(&response.body, response.content_type.as_deref(), &profile.encoding))
        })
        .await;

        match retried.outcome {
            Ok(html) => FetchResult::Success { html, attempts: retried.attempts },
            Err(e) => FetchResult::Failure {
                error: ExtractError::FetchExhausted { attempts: retried.attempts, message: e.to_string() },
                attempts: retried.attempts,
            },
        }
    }
}

/// Decode a response body to text.
///
/// The charset in `content_type` wins, then `fallback_label`, then UTF-8.
/// A byte-order mark overrides all of them. Undecodable bytes become U+FFFD.
pub fn decode_body(body: &[u8], content_type: Option<&str>, fallback_label: &str) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| Encoding::for_label(fallback_label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Reads raw HTML bytes from a local file.
pub fn fetch_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    fs::read(path.as_ref()).map_err(ExtractError::from)
}

/// Reads raw HTML bytes from standard input until EOF.
pub fn fetch_stdin() -> Result<Vec<u8>> {
    use std::io::{self, Read};

    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;
    Ok(buffer)
}
