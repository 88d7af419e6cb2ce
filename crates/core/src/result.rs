//! Parse requests and the result document.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::content::ContentType;
use crate::error::ExtractError;
use crate::fields::Record;
use crate::sanitize::IssueReport;
use crate::strategy::{ChainOutcome, StrategyAttempt};

/// Input of one parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub url: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub options: ParseOptions,
}

impl ParseRequest {
    pub fn new(url: impl Into<String>, content_type: ContentType) -> Self {
        Self { url: url.into(), content_type, options: ParseOptions::default() }
    }

    pub fn bypass_cache(mut self, value: bool) -> Self {
        self.options.bypass_cache = value;
        self
    }
}

/// Per-request options. Unknown keys are kept as they came.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    /// Skip both the cache lookup and the cache store
    #[serde(default)]
    pub bypass_cache: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything a parse produced. The only artifact a caller sees.
///
/// `success` is true exactly when `records` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub url: String,
    pub content_type: ContentType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub success: bool,
    pub records: Vec<Record>,
    pub strategies_attempted: Vec<StrategyAttempt>,
    pub issues: Vec<IssueReport>,
    pub processing_time_ms: u64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseResult {
    /// Name of the strategy that produced the records.
    pub fn winning_strategy(&self) -> Option<&str> {
        self.strategies_attempted.iter().find(|a| a.success).map(|a| a.name.as_str())
    }
}

/// Assembles a [`ParseResult`] as the pipeline runs.
#[derive(Debug)]
pub struct Aggregator {
    url: String,
    content_type: ContentType,
    timestamp: OffsetDateTime,
    started: Instant,
    issues: Vec<IssueReport>,
}

impl Aggregator {
    /// Start the clock for one parse.
    pub fn start(url: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            url: url.into(),
            content_type,
            timestamp: OffsetDateTime::now_utc(),
            started: Instant::now(),
            issues: Vec::new(),
        }
    }

    pub fn issues(&mut self, issues: Vec<IssueReport>) {
        self.issues = issues;
    }

    /// Result carrying the chain's records. Empty records are dropped here
    /// too, so `success` always matches `records`.
    pub fn finish(self, outcome: ChainOutcome) -> ParseResult {
        let records: Vec<Record> = outcome.records.into_iter().filter(|r| !r.is_empty()).collect();
        let mut attempts = outcome.attempts;

        // The winning attempt reports what survived the filter.
        if let Some(winner) = attempts.iter_mut().rev().find(|a| a.success) {
            winner.records_found = records.len();
            winner.success = !records.is_empty();
        }

        self.build(records, attempts, None)
    }

    /// Failed result for an error that stopped the pipeline.
    pub fn fail(self, error: &ExtractError) -> ParseResult {
        self.build(Vec::new(), Vec::new(), Some(error.to_string()))
    }

    fn build(self, records: Vec<Record>, attempts: Vec<StrategyAttempt>, error: Option<String>) -> ParseResult {
        ParseResult {
            url: self.url,
            content_type: self.content_type,
            timestamp: self.timestamp,
            success: !records.is_empty(),
            records,
            strategies_attempted: attempts,
            issues: self.issues,
            processing_time_ms: elapsed_ms(self.started),
            cached: false,
            error,
        }
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
