//! Main extraction API.
//!
//! [`Extractor`] owns one instance of every pipeline stage and runs them in
//! order: resolve the site profile, consult the cache, fetch, sanitize, run
//! the strategy chain and aggregate. Convenience functions
//! [`extract_html`] and [`fetch_and_extract`] cover one-off use.
//!
//! # Example
//!
//! ```rust,no_run
//! use grantscope_core::{ContentType, Extractor};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let extractor = Extractor::new();
//! let result = extractor.parse("https://www.grants.gov/search-grants", ContentType::Grants).await;
//! for record in &result.records {
//!     println!("{:?}", record.get("title"));
//! }
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::cache::{Cache, CacheKey, DEFAULT_TTL, MemoryCache};
use crate::content::ContentType;
use crate::error::ExtractError;
#[cfg(feature = "fetch")]
use crate::fetch::HttpTransport;
use crate::fetch::{BROWSER_USER_AGENT, FetchResult, Fetcher, Transport, decode_body};
use crate::profile::{ProfileResolver, SiteProfile};
use crate::result::{Aggregator, ParseRequest, ParseResult};
use crate::sanitize::Sanitizer;
use crate::stats::{Stats, StatsSnapshot};
use crate::strategy::{ExtractionContext, StrategyChain};

/// Configuration for an [`Extractor`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use grantscope_core::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .cache_ttl(Duration::from_secs(600))
///     .backoff_step(Duration::from_millis(500))
///     .build();
/// assert!(config.cache_enabled);
/// ```
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// How long a successful result stays cached (default: 30 minutes).
    pub cache_ttl: Duration,

    /// Whether results are cached at all (default: true).
    pub cache_enabled: bool,

    /// User-Agent sent with every request (default: desktop Chrome).
    pub user_agent: String,

    /// Backoff unit; the wait after attempt `n` is `n * backoff_step`
    /// (default: 2000 ms).
    pub backoff_step: Duration,

    /// Directory of site profile files. `None` uses the user config
    /// directory when it exists.
    pub profiles_dir: Option<PathBuf>,

    /// Replaces every profile's timeout when set.
    pub timeout: Option<Duration>,

    /// Replaces every profile's retry count when set.
    pub max_retries: Option<u32>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            cache_enabled: true,
            user_agent: BROWSER_USER_AGENT.to_string(),
            backoff_step: Duration::from_millis(2000),
            profiles_dir: None,
            timeout: None,
            max_retries: None,
        }
    }
}

impl ExtractorConfig {
    /// Creates a new builder for ExtractorConfig.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder::new()
    }
}

/// Builder for ExtractorConfig.
#[derive(Debug, Default)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_ttl(mut self, value: Duration) -> Self {
        self.config.cache_ttl = value;
        self
    }

    pub fn cache_enabled(mut self, value: bool) -> Self {
        self.config.cache_enabled = value;
        self
    }

    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.config.user_agent = value.into();
        self
    }

    pub fn backoff_step(mut self, value: Duration) -> Self {
        self.config.backoff_step = value;
        self
    }

    pub fn profiles_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.profiles_dir = Some(value.into());
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.config.timeout = Some(value);
        self
    }

    pub fn max_retries(mut self, value: u32) -> Self {
        self.config.max_retries = Some(value);
        self
    }

    pub fn build(self) -> ExtractorConfig {
        self.config
    }
}

/// The extraction pipeline.
///
/// Parses never return `Err`. Everything that can go wrong, from a bad URL
/// to an unreachable site, is reported in [`ParseResult::error`] with
/// `success: false`. Safe to share between tasks behind an `Arc`.
#[derive(Debug)]
pub struct Extractor<T> {
    config: ExtractorConfig,
    resolver: ProfileResolver,
    fetcher: Fetcher<T>,
    sanitizer: Sanitizer,
    chain: StrategyChain,
    cache: Cache<MemoryCache>,
    stats: Arc<Stats>,
}

#[cfg(feature = "fetch")]
impl Extractor<HttpTransport> {
    /// Extractor over HTTP with default settings.
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    pub fn with_config(config: ExtractorConfig) -> Self {
        Self::with_transport(HttpTransport::new(), config)
    }
}

#[cfg(feature = "fetch")]
impl Default for Extractor<HttpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Extractor<T> {
    /// Extractor fetching through `transport`.
    pub fn with_transport(transport: T, config: ExtractorConfig) -> Self {
        let resolver = match &config.profiles_dir {
            Some(dir) => ProfileResolver::load_dir(dir).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "using built-in site profiles only");
                ProfileResolver::new()
            }),
            None => ProfileResolver::from_default_dir(),
        };
        let fetcher = Fetcher::new(transport)
            .user_agent(config.user_agent.clone())
            .backoff_step(config.backoff_step);

        Self {
            cache: Cache::new(MemoryCache::new(), config.cache_ttl),
            resolver,
            fetcher,
            sanitizer: Sanitizer::new(),
            chain: StrategyChain::default(),
            stats: Arc::new(Stats::new()),
            config,
        }
    }

    /// Replace the profile resolver.
    pub fn with_resolver(mut self, resolver: ProfileResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Record into a shared sink instead of a private one.
    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache(&self) -> &Cache<MemoryCache> {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        self.fetcher.transport()
    }

    /// Site profile for `url`, with configured overrides applied.
    pub fn profile_for(&self, url: &Url) -> SiteProfile {
        let mut profile = self.resolver.resolve(url);
        if let Some(timeout) = self.config.timeout {
            profile.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        }
        if let Some(retries) = self.config.max_retries {
            profile.max_retries = retries;
        }
        profile
    }

    /// Fetch and extract `url`.
    pub async fn parse(&self, url: &str, content_type: ContentType) -> ParseResult {
        self.parse_request(&ParseRequest::new(url, content_type)).await
    }

    /// Run the full pipeline for one request.
    ///
    /// The cache is consulted first unless caching is disabled or the
    /// request asks to bypass it. Only successful results are stored.
    pub async fn parse_request(&self, request: &ParseRequest) -> ParseResult {
        self.stats.record_request();
        let content_type = request.content_type;

        let url = match validate_url(&request.url) {
            Ok(url) => url,
            Err(e) => {
                let result = Aggregator::start(request.url.as_str(), content_type).fail(&e);
                self.stats.record_parse(&result);
                log_result(&result);
                return result;
            }
        };

        // Keyed and reported on the trimmed string, the one that was validated.
        let raw = request.url.trim();
        let result = if self.config.cache_enabled && !request.options.bypass_cache {
            let key = CacheKey::new(raw, content_type);
            let result = self.cache.get_or_compute(&key, || self.run_pipeline(raw, &url, content_type)).await;
            self.stats.record_cache(result.cached);
            result
        } else {
            self.run_pipeline(raw, &url, content_type).await
        };

        log_result(&result);
        result
    }

    /// Extract records from HTML already in hand. No fetch, no cache.
    ///
    /// `source_url` only selects the site profile (and so the site-specific
    /// rule); it is not fetched.
    pub fn parse_html(&self, html: &str, source_url: Option<&str>, content_type: ContentType) -> ParseResult {
        self.stats.record_request();
        let profile = self.offline_profile(source_url);
        let aggregator = Aggregator::start(source_url.unwrap_or_default(), content_type);

        let result = extract_document(&self.sanitizer, &self.chain, aggregator, html, &profile, content_type);
        self.stats.record_parse(&result);
        log_result(&result);
        result
    }

    /// Like [`parse_html`](Self::parse_html) for raw bytes, decoded with the
    /// profile's encoding.
    pub fn parse_bytes(&self, bytes: &[u8], source_url: Option<&str>, content_type: ContentType) -> ParseResult {
        let profile = self.offline_profile(source_url);
        let html = decode_body(bytes, None, &profile.encoding);
        self.parse_html(&html, source_url, content_type)
    }

    fn offline_profile(&self, source_url: Option<&str>) -> SiteProfile {
        source_url
            .and_then(|raw| Url::parse(raw).ok())
            .map(|url| self.profile_for(&url))
            .unwrap_or_default()
    }

    async fn run_pipeline(&self, raw_url: &str, url: &Url, content_type: ContentType) -> ParseResult {
        let aggregator = Aggregator::start(raw_url, content_type);
        let profile = self.profile_for(url);

        let fetched = self.fetcher.fetch(url, &profile).await;
        self.stats.record_fetch(fetched.attempts(), fetched.is_success());

        let result = match fetched {
            FetchResult::Success { html, .. } => {
                extract_document(&self.sanitizer, &self.chain, aggregator, &html, &profile, content_type)
            }
            FetchResult::Failure { error, .. } => aggregator.fail(&error),
        };
        self.stats.record_parse(&result);
        result
    }
}

/// Sanitize, run the chain and aggregate.
fn extract_document(
    sanitizer: &Sanitizer, chain: &StrategyChain, mut aggregator: Aggregator, html: &str, profile: &SiteProfile,
    content_type: ContentType,
) -> ParseResult {
    let document = sanitizer.sanitize(html);
    aggregator.issues(document.issues_found);

    let ctx = ExtractionContext::new(content_type, profile);
    aggregator.finish(chain.run(&document.html, &ctx))
}

/// Absolute `http` or `https` URL with a host.
fn validate_url(raw: &str) -> Result<Url, ExtractError> {
    let url = Url::parse(raw.trim()).map_err(|e| ExtractError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractError::InvalidUrl(format!("{raw}: unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ExtractError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

fn log_result(result: &ParseResult) {
    info!(
        url = %result.url,
        success = result.success,
        records = result.records.len(),
        strategy = result.winning_strategy().unwrap_or("none"),
        cached = result.cached,
        elapsed_ms = result.processing_time_ms,
        "parse finished"
    );
}

/// Extract records from an HTML string with the default profile.
///
/// # Example
///
/// ```rust
/// use grantscope_core::{ContentType, extract_html};
///
/// let html = "<table><tr><td>Ocean Grant</td><td>EPA</td><td>12/31/2025</td><td>$50,000</td></tr></table>";
/// let result = extract_html(html, ContentType::Grants);
/// assert!(result.success);
/// assert_eq!(result.records[0].get("agency"), Some("EPA"));
/// ```
pub fn extract_html(html: &str, content_type: ContentType) -> ParseResult {
    let aggregator = Aggregator::start("", content_type);
    extract_document(
        &Sanitizer::new(),
        &StrategyChain::default(),
        aggregator,
        html,
        &SiteProfile::default(),
        content_type,
    )
}

/// Fetch and extract a URL with a one-off [`Extractor`].
#[cfg(feature = "fetch")]
pub async fn fetch_and_extract(url: &str, content_type: ContentType) -> ParseResult {
    Extractor::with_config(ExtractorConfig::builder().cache_enabled(false).build())
        .parse(url, content_type)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::TransportResponse;
    use crate::fetch::mock::{ScriptedTransport, html_response};
    use crate::sanitize::IssueType;

    const OCEAN_GRANT: &str =
        "<table><tr><td>Ocean Grant</td><td>EPA</td><td>12/31/2025</td><td>$50,000</td>";

    fn extractor(transport: ScriptedTransport) -> Extractor<ScriptedTransport> {
        let config = ExtractorConfig::builder().backoff_step(Duration::ZERO).build();
        Extractor::with_transport(transport, config).with_resolver(ProfileResolver::new())
    }

    #[test]
    fn test_config_builder() {
        let config = ExtractorConfig::builder()
            .cache_enabled(false)
            .user_agent("grantscope-test")
            .timeout(Duration::from_secs(5))
            .max_retries(1)
            .build();

        assert!(!config.cache_enabled);
        assert_eq!(config.user_agent, "grantscope-test");
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.max_retries, Some(1));
    }

    #[tokio::test]
    async fn test_unclosed_table_scenario() {
        let ex = extractor(ScriptedTransport::ok(OCEAN_GRANT));
        let result = ex.parse("https://www.epa.gov/grants", ContentType::Grants).await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.issues.iter().any(|i| i.issue_type == IssueType::BrokenTables));
        assert_eq!(result.strategies_attempted.len(), 1);
        assert_eq!(result.strategies_attempted[0].name, "structural");
        assert_eq!(result.strategies_attempted[0].records_found, 1);

        let record = &result.records[0];
        assert_eq!(record.get("title"), Some("Ocean Grant"));
        assert_eq!(record.get("agency"), Some("EPA"));
        assert_eq!(record.get("deadline"), Some("12/31/2025"));
        assert_eq!(record.get("amount"), Some("$50,000"));
    }

    #[tokio::test]
    async fn test_second_parse_served_from_cache() {
        let ex = extractor(ScriptedTransport::ok(OCEAN_GRANT));
        let url = "https://www.epa.gov/grants";

        let first = ex.parse(url, ContentType::Grants).await;
        let second = ex.parse(url, ContentType::Grants).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.records, first.records);
        assert_eq!(ex.transport().calls(), 1);

        let stats = ex.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!((stats.cache_hits, stats.cache_misses), (1, 1));
        assert_eq!(stats.successful_parses, 1);
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_shares_cache_entry() {
        let ex = extractor(ScriptedTransport::ok(OCEAN_GRANT));

        let first = ex.parse("  https://www.epa.gov/grants \n", ContentType::Grants).await;
        let second = ex.parse("https://www.epa.gov/grants", ContentType::Grants).await;

        assert_eq!(first.url, "https://www.epa.gov/grants");
        assert!(second.cached);
        assert_eq!(ex.transport().calls(), 1);
        assert_eq!(ex.cache().store().len(), 1);
    }

    #[tokio::test]
    async fn test_other_content_type_is_a_different_entry() {
        let ex = extractor(ScriptedTransport::ok(OCEAN_GRANT));
        ex.parse("https://www.epa.gov/grants", ContentType::Grants).await;
        let funding = ex.parse("https://www.epa.gov/grants", ContentType::Funding).await;

        assert!(!funding.cached);
        assert_eq!(funding.records[0].get("sponsor"), Some("EPA"));
        assert_eq!(ex.transport().calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_not_cached() {
        let ex = extractor(ScriptedTransport::failing("connection refused"));
        let url = "https://unreachable.example.com/";

        let first = ex.parse(url, ContentType::Grants).await;
        let second = ex.parse(url, ContentType::Grants).await;

        assert!(!first.success);
        assert!(first.records.is_empty());
        assert!(first.strategies_attempted.is_empty());
        assert!(first.error.as_deref().unwrap().contains("connection refused"));
        assert!(!second.cached);
        assert_eq!(ex.transport().calls(), 6);

        let stats = ex.stats();
        assert_eq!(stats.fetch_failures, 2);
        assert_eq!(stats.fetch_attempts, 6);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse { status: 503, content_type: None, body: Vec::new() }),
            Ok(html_response(OCEAN_GRANT)),
        ]);
        let ex = extractor(transport);
        let result = ex.parse("https://www.nsf.gov/funding", ContentType::Grants).await;

        assert!(result.success);
        assert_eq!(ex.transport().calls(), 2);
    }

    #[tokio::test]
    async fn test_no_records_is_a_failed_result() {
        let ex = extractor(ScriptedTransport::ok("<p>Office closed for the holiday.</p>"));
        let result = ex.parse("https://www.epa.gov/", ContentType::Grants).await;

        assert!(!result.success);
        assert!(result.error.is_none());
        assert_eq!(result.strategies_attempted.len(), 5);
        assert!(ex.cache().store().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_skips_fetch() {
        let ex = extractor(ScriptedTransport::ok(OCEAN_GRANT));

        for url in ["not a url", "ftp://files.example.gov/x", "/relative/path"] {
            let result = ex.parse(url, ContentType::Grants).await;
            assert!(!result.success, "{url}");
            assert!(result.error.as_deref().unwrap().starts_with("Invalid URL"), "{url}");
            assert_eq!(result.url, url);
        }
        assert_eq!(ex.transport().calls(), 0);
        assert!(ex.cache().store().is_empty());
    }

    #[tokio::test]
    async fn test_bypass_cache() {
        let ex = extractor(ScriptedTransport::ok(OCEAN_GRANT));
        let request = ParseRequest::new("https://www.epa.gov/grants", ContentType::Grants).bypass_cache(true);

        ex.parse_request(&request).await;
        let second = ex.parse_request(&request).await;

        assert!(!second.cached);
        assert_eq!(ex.transport().calls(), 2);
        assert!(ex.cache().store().is_empty());
    }

    #[tokio::test]
    async fn test_retry_override() {
        let config = ExtractorConfig::builder().backoff_step(Duration::ZERO).max_retries(1).build();
        let ex = Extractor::with_transport(ScriptedTransport::failing("reset"), config)
            .with_resolver(ProfileResolver::new());

        let result = ex.parse("https://www.grants.gov/", ContentType::Grants).await;
        assert!(!result.success);
        assert_eq!(ex.transport().calls(), 1);
    }

    #[test]
    fn test_parse_html_uses_source_profile() {
        let ex = extractor(ScriptedTransport::ok(""));
        let html = r#"<script id="__NEXT_DATA__" type="application/json">
            {"props":{"opportunities":[{"title":"Solar Grid Modernization","agency":"DOE"}]}}</script>"#;

        let result = ex.parse_html(html, Some("https://www.usaspending.gov/search"), ContentType::Grants);

        assert!(result.success);
        assert_eq!(result.winning_strategy(), Some("site_specific"));
        assert_eq!(result.records[0].get("agency"), Some("DOE"));
        assert_eq!(ex.transport().calls(), 0);
    }

    #[test]
    fn test_parse_bytes_decodes_profile_encoding() {
        let ex = extractor(ScriptedTransport::ok(""));
        let mut bytes = b"<table><tr><td>Caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b" Grant</td><td>State</td><td>01/02/2026</td><td>$5,000</td></tr></table>");

        let result = ex.parse_bytes(&bytes, Some("https://agency.state.us/"), ContentType::Grants);
        assert_eq!(result.records[0].get("title"), Some("Café Grant"));
    }

    #[test]
    fn test_extract_html_convenience() {
        let result = extract_html("Research Funding Opportunity deadline March 2025 amount $10,000", ContentType::Grants);

        assert!(result.success);
        assert_eq!(result.winning_strategy(), Some("text_extraction"));
        assert_eq!(result.records[0].get("deadline"), Some("March 2025"));
    }
}
