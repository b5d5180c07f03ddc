//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building one pooled HTTP client per crawl run
//! - Per-domain pacing before every request dispatch
//! - Retry with exponential backoff for transient failures
//! - Manual redirect handling with a recorded redirect chain
//! - Content-type classification of the response body
//!
//! Ordinary network failures never surface as `Err`: they are folded into the
//! returned [`FetchResult`].

use crate::config::CrawlConfig;
use crate::crawler::pacer::Pacer;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect::Policy, Client, Method, Response, StatusCode};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Error details are cut to this many characters
const MAX_ERROR_DETAIL: usize = 100;

/// Upper bound for a single backoff wait
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// HEAD probes never wait longer than this
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Status codes that trigger a transport-level retry
const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Transport or status failure of one fetch
///
/// The `Display` form is what gets logged and written to the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Timeout")]
    Timeout,

    #[error("TooManyRedirects")]
    TooManyRedirects,

    #[error("ConnectionError: {0}")]
    Connection(String),

    #[error("UnexpectedError: {0}")]
    Unexpected(String),
}

impl FetchError {
    /// Creates a connection error with a truncated detail string
    pub fn connection(detail: impl ToString) -> Self {
        Self::Connection(truncate_detail(&detail.to_string()))
    }

    /// Creates an unexpected error with a truncated detail string
    pub fn unexpected(detail: impl ToString) -> Self {
        Self::Unexpected(truncate_detail(&detail.to_string()))
    }

    /// Classifies a reqwest error
    fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_redirect() {
            Self::TooManyRedirects
        } else if error.is_connect() {
            Self::connection(error)
        } else {
            Self::unexpected(error)
        }
    }

    /// Whether another attempt may succeed
    fn is_transient(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }
}

fn truncate_detail(detail: &str) -> String {
    detail.chars().take(MAX_ERROR_DETAIL).collect()
}

/// Coarse classification of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Pdf,
    Image,
    Other,
}

impl ContentKind {
    /// Classifies a `Content-Type` header value
    ///
    /// | Content-Type contains                          | Kind  |
    /// |------------------------------------------------|-------|
    /// | `text/html`, `application/xhtml`               | Html  |
    /// | `application/pdf`                              | Pdf   |
    /// | `image/jpeg`, `png`, `webp`, `gif`, `bmp`      | Image |
    /// | anything else (including a missing header)     | Other |
    pub fn from_content_type(content_type: &str) -> Self {
        const TABLE: &[(&str, ContentKind)] = &[
            ("text/html", ContentKind::Html),
            ("application/xhtml", ContentKind::Html),
            ("application/pdf", ContentKind::Pdf),
            ("image/jpeg", ContentKind::Image),
            ("image/png", ContentKind::Image),
            ("image/webp", ContentKind::Image),
            ("image/gif", ContentKind::Image),
            ("image/bmp", ContentKind::Image),
        ];

        let content_type = content_type.to_ascii_lowercase();
        TABLE
            .iter()
            .find(|(needle, _)| content_type.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(ContentKind::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

/// Body of an unclassified response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

/// Decoded body of a successful response
///
/// Text and raw bytes are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Html(String),
    Pdf(Vec<u8>),
    Image(Vec<u8>),
    Other(Body),
}

impl Payload {
    /// Builds the payload variant for `kind` from the raw body
    ///
    /// HTML is decoded leniently. Unknown types are kept as text when they are
    /// valid UTF-8 and as bytes otherwise.
    pub fn classify(kind: ContentKind, bytes: Vec<u8>) -> Self {
        match kind {
            ContentKind::Html => Self::Html(String::from_utf8_lossy(&bytes).into_owned()),
            ContentKind::Pdf => Self::Pdf(bytes),
            ContentKind::Image => Self::Image(bytes),
            ContentKind::Other => match String::from_utf8(bytes) {
                Ok(text) => Self::Other(Body::Text(text)),
                Err(e) => Self::Other(Body::Bytes(e.into_bytes())),
            },
        }
    }
}

/// Outcome of one `Fetcher::fetch` call, after internal retries
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL that was requested
    pub url: String,

    /// URL that produced the final response
    pub final_url: String,

    /// Status of the final response (0 when no response arrived)
    pub status_code: u16,

    /// Lower-cased `Content-Type` header of the final response
    pub content_type: String,

    pub kind: ContentKind,

    /// Present only on success
    pub payload: Option<Payload>,

    /// Every URL that answered with a redirect, starting with `url`
    pub redirect_chain: Vec<String>,

    pub elapsed: Duration,

    pub error: Option<FetchError>,

    /// Response headers with lower-cased names
    pub headers: HashMap<String, String>,
}

impl FetchResult {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status_code: 0,
            content_type: String::new(),
            kind: ContentKind::Other,
            payload: None,
            redirect_chain: Vec::new(),
            elapsed: Duration::ZERO,
            error: None,
            headers: HashMap::new(),
        }
    }

    /// True iff the final status is exactly 200 and no error was recorded
    pub fn success(&self) -> bool {
        self.status_code == 200 && self.error.is_none()
    }

    /// Decoded text for HTML and textual unknown bodies
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Some(Payload::Html(text)) | Some(Payload::Other(Body::Text(text))) => Some(text),
            _ => None,
        }
    }

    /// Raw bytes for PDFs, images and undecodable unknown bodies
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(Payload::Pdf(bytes))
            | Some(Payload::Image(bytes))
            | Some(Payload::Other(Body::Bytes(bytes))) => Some(bytes),
            _ => None,
        }
    }

    pub fn was_redirected(&self) -> bool {
        !self.redirect_chain.is_empty()
    }
}

/// Metadata from a HEAD probe
#[derive(Debug, Clone, Default)]
pub struct HeadInfo {
    /// 0 when the probe failed
    pub status_code: u16,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub final_url: String,
    pub error: Option<String>,
}

/// HTTP fetcher owning the connection pool of one crawl run
///
/// Create it with [`Fetcher::open`] and release it with [`Fetcher::close`].
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    pacer: Pacer,
    user_agent: String,
    max_retries: u32,
    backoff_factor: Duration,
    max_redirects: usize,
    timeout: Duration,
}

impl Fetcher {
    /// Opens a fetcher with a fresh pacer
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl settings (timeout, retries, user agent, pacing delay)
    ///
    /// # Returns
    ///
    /// * `Ok(Fetcher)` - Client built and ready
    /// * `Err(reqwest::Error)` - The TLS backend or client could not be set up
    pub fn open(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        Self::with_pacer(config, Pacer::new(config.domain_delay()))
    }

    /// Opens a fetcher that shares an existing pacer
    pub fn with_pacer(config: &CrawlConfig, pacer: Pacer) -> Result<Self, reqwest::Error> {
        let timeout = config.request_timeout();
        let client = build_http_client(config)?;

        tracing::debug!(
            "HTTP client ready (timeout {:?}, retries {}, user agent {})",
            timeout,
            config.max_retries,
            config.user_agent
        );

        Ok(Self {
            client,
            pacer,
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor(),
            max_redirects: config.max_redirects,
            timeout,
        })
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Fetches a URL with pacing, retries and redirect tracking
    ///
    /// Never fails: transport errors, non-200 statuses and redirect overflow
    /// are recorded in the returned result, and `elapsed` is always set.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let start = Instant::now();
        let mut result = FetchResult::new(url);

        match self.follow(Method::GET, url, &mut result.redirect_chain).await {
            Ok((final_url, response)) => {
                let status = response.status();
                result.final_url = final_url.to_string();
                result.status_code = status.as_u16();
                result.headers = collect_headers(response.headers());
                result.content_type = result
                    .headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                result.kind = ContentKind::from_content_type(&result.content_type);

                if status == StatusCode::OK {
                    match response.bytes().await {
                        Ok(bytes) => {
                            result.payload = Some(Payload::classify(result.kind, bytes.to_vec()))
                        }
                        Err(e) => result.error = Some(FetchError::from_reqwest(&e)),
                    }
                } else {
                    result.error = Some(FetchError::Status(result.status_code));
                }
            }
            Err(e) => result.error = Some(e),
        }

        result.elapsed = start.elapsed();
        if let Some(error) = &result.error {
            tracing::warn!("Fetch of {} failed: {} ({:?})", url, error, result.elapsed);
        } else {
            tracing::debug!(
                "Fetched {} ({}, {} in {:?})",
                url,
                result.status_code,
                result.kind.as_str(),
                result.elapsed
            );
        }

        result
    }

    /// Best-effort HEAD probe
    ///
    /// Returns status 0 and an error string instead of failing.
    pub async fn head(&self, url: &str) -> HeadInfo {
        let mut chain = Vec::new();
        match self.follow(Method::HEAD, url, &mut chain).await {
            Ok((final_url, response)) => {
                let headers = response.headers();
                HeadInfo {
                    status_code: response.status().as_u16(),
                    content_type: headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string(),
                    content_length: headers
                        .get(header::CONTENT_LENGTH)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse().ok()),
                    final_url: final_url.to_string(),
                    error: None,
                }
            }
            Err(e) => HeadInfo {
                status_code: 0,
                final_url: url.to_string(),
                error: Some(e.to_string()),
                ..HeadInfo::default()
            },
        }
    }

    /// Releases the connection pool
    pub fn close(self) {
        tracing::debug!("Closing HTTP client");
        drop(self.client);
    }

    /// Sends `method` to `url`, following redirects manually
    ///
    /// Every URL that answers with a redirect is appended to `chain`.
    async fn follow(
        &self,
        method: Method,
        url: &str,
        chain: &mut Vec<String>,
    ) -> Result<(Url, Response), FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::unexpected(e))?;

        loop {
            let response = self.send(method.clone(), &current).await?;

            let location = response
                .status()
                .is_redirection()
                .then(|| response.headers().get(header::LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let Some(location) = location else {
                return Ok((current, response));
            };

            if chain.len() >= self.max_redirects {
                return Err(FetchError::TooManyRedirects);
            }

            let next = current
                .join(&location)
                .map_err(|e| FetchError::unexpected(format!("bad redirect {}: {}", location, e)))?;
            if next.scheme() != "http" && next.scheme() != "https" {
                return Err(FetchError::unexpected(format!(
                    "redirect to unsupported scheme: {}",
                    next
                )));
            }

            tracing::debug!("{} redirected to {}", current, next);
            chain.push(current.to_string());
            current = next;
        }
    }

    /// Sends one request with pacing and the retry policy applied
    ///
    /// Only GET and HEAD are retried. A retryable status that survives every
    /// attempt is returned as a normal response.
    async fn send(&self, method: Method, url: &Url) -> Result<Response, FetchError> {
        let idempotent = method == Method::GET || method == Method::HEAD;
        let host = url.host_str().unwrap_or_default().to_string();
        let mut attempt: u32 = 0;

        loop {
            self.pacer.wait(&host).await;

            let mut request = self.client.request(method.clone(), url.clone());
            if method == Method::HEAD {
                request = request.timeout(HEAD_TIMEOUT.min(self.timeout));
            }

            let retry_in = match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !(idempotent && attempt < self.max_retries && RETRY_STATUSES.contains(&status)) {
                        return Ok(response);
                    }
                    tracing::warn!("HTTP {} from {}, retrying", status, url);
                    backoff_delay(
                        self.backoff_factor,
                        attempt + 1,
                        retry_after(response.headers()),
                    )
                }
                Err(e) => {
                    if !(idempotent && attempt < self.max_retries && FetchError::is_transient(&e)) {
                        return Err(FetchError::from_reqwest(&e));
                    }
                    tracing::warn!("Request to {} failed ({}), retrying", url, e);
                    backoff_delay(self.backoff_factor, attempt + 1, None)
                }
            };

            attempt += 1;
            tracing::debug!("Retry {} of {} for {} in {:?}", attempt, self.max_retries, url, retry_in);
            tokio::time::sleep(retry_in).await;
        }
    }
}

/// Builds the pooled client used by a fetcher
///
/// Redirects are disabled so the fetcher can record the chain itself.
pub fn build_http_client(config: &CrawlConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-IN,en;q=0.9,hi;q=0.8"),
    );

    let timeout = config.request_timeout();

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Wait before retry number `attempt` (1-based)
///
/// `factor * 2^(attempt - 1)`, raised to a numeric `Retry-After` if that is
/// longer, and capped at two minutes.
pub fn backoff_delay(factor: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let backoff = factor.saturating_mul(1u32 << exponent);
    backoff.max(retry_after.unwrap_or_default()).min(MAX_BACKOFF)
}

/// Parses a numeric `Retry-After` header
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
