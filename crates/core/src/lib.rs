pub mod cache;
pub mod content;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod fields;
pub mod formatters;
pub mod profile;
pub mod result;
pub mod sanitize;
pub mod stats;
pub mod strategy;

pub use cache::{Cache, CacheKey, CacheStore, MemoryCache};
pub use content::{ContentType, FieldRole};
pub use error::{ExtractError, Result, StrategyError, TransportError};
#[cfg(feature = "fetch")]
pub use extractor::fetch_and_extract;
pub use extractor::{Extractor, ExtractorConfig, ExtractorConfigBuilder, extract_html};
#[cfg(feature = "fetch")]
pub use fetch::HttpTransport;
pub use fetch::{FetchResult, Fetcher, RetryPolicy, Transport, TransportRequest, TransportResponse, retry};
pub use fetch::{fetch_file, fetch_stdin};
pub use fields::{Record, clean_value};
pub use formatters::{JsonConfig, JsonFormatter, TextConfig, TextFormatter, records_to_json, to_json, to_text};
pub use profile::{ProfileEntry, ProfileParser, ProfileResolver, SiteProfile, SiteRule};
pub use result::{Aggregator, ParseOptions, ParseRequest, ParseResult};
pub use sanitize::{IssueReport, IssueType, SanitizedDocument, Sanitizer};
pub use stats::{Stats, StatsSnapshot};
pub use strategy::{ChainOutcome, ExtractionContext, Strategy, StrategyAttempt, StrategyChain};
