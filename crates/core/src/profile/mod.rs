//! Per-domain site profiles.
//!
//! A [`SiteProfile`] tells the fetcher how long to wait, how often to
//! retry, which encoding to assume and which extra headers to send, and
//! tells the site-specific strategy which [`SiteRule`] to run.
//!
//! Profiles come from a built-in table of government domains plus optional
//! directive files:
//!
//! ```text
//! # bids.example.gov.txt
//! pattern: bids.example.gov
//! timeout: 45000
//! retries: 5
//! encoding: windows-1252
//! rule: embedded_json
//! http_header(Referer): https://bids.example.gov/
//! ```

pub mod directives;
pub mod parser;
pub mod resolver;

pub use directives::{Directive, ProfileEntry, parse_directive};
pub use parser::ProfileParser;
pub use resolver::ProfileResolver;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Site-specific extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteRule {
    /// Header-mapped tables, then keyword blocks
    #[default]
    Generic,
    /// Search-results table with a fixed column layout
    GrantsGovTable,
    /// JSON state embedded in `<script>` tags
    EmbeddedJson,
}

impl SiteRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteRule::Generic => "generic",
            SiteRule::GrantsGovTable => "grants_gov_table",
            SiteRule::EmbeddedJson => "embedded_json",
        }
    }
}

impl fmt::Display for SiteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "grants_gov_table" => Ok(Self::GrantsGovTable),
            "embedded_json" => Ok(Self::EmbeddedJson),
            _ => Err(format!("Unknown rule: {}", s)),
        }
    }
}

/// Fetch and extraction settings for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteProfile {
    /// The pattern that selected this profile, or `"unknown"`
    pub domain_pattern: String,
    /// Encoding label used when the response does not declare a charset
    pub encoding: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub rule: SiteRule,
    pub http_headers: Vec<(String, String)>,
}

impl SiteProfile {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            domain_pattern: "unknown".to_string(),
            encoding: "utf-8".to_string(),
            timeout_ms: 15_000,
            max_retries: 3,
            rule: SiteRule::Generic,
            http_headers: Vec::new(),
        }
    }
}
