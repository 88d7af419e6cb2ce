//! The extraction strategy chain.
//!
//! Five independent strategies, tried in a fixed priority order until one
//! yields at least one non-empty [`Record`]. A strategy that errors or
//! finds nothing is recorded as a failed [`StrategyAttempt`] and the chain
//! moves on; nothing a strategy does can abort a parse.
//!
//! | priority | strategy | reliability |
//! |---|---|---|
//! | 1 | [`Strategy::Structural`] | 0.9 |
//! | 2 | [`Strategy::RegexFallback`] | 0.7 |
//! | 3 | [`Strategy::TextExtraction`] | 0.5 |
//! | 4 | [`Strategy::HeuristicRelevance`] | 0.8 |
//! | 5 | [`Strategy::SiteSpecific`] | 0.6 |
//!
//! The heuristic scorer runs fourth despite its higher reliability because
//! it is the most expensive pass.

pub mod heuristic;
pub mod regex_fallback;
pub mod site_specific;
pub mod structural;
pub mod text;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{ContentType, FieldRole};
use crate::error::StrategyError;
use crate::fields::Record;
use crate::profile::SiteProfile;

/// What a strategy knows about the page besides its markup.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub content_type: ContentType,
    /// Profile of the page's domain; selects the site-specific rule
    pub profile: &'a SiteProfile,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(content_type: ContentType, profile: &'a SiteProfile) -> Self {
        Self { content_type, profile }
    }
}

/// One extraction technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Structural,
    RegexFallback,
    TextExtraction,
    HeuristicRelevance,
    SiteSpecific,
}

impl Strategy {
    /// Every strategy, in the order the chain tries them.
    pub const PRIORITY: [Strategy; 5] = [
        Strategy::Structural,
        Strategy::RegexFallback,
        Strategy::TextExtraction,
        Strategy::HeuristicRelevance,
        Strategy::SiteSpecific,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Structural => "structural",
            Strategy::RegexFallback => "regex_fallback",
            Strategy::TextExtraction => "text_extraction",
            Strategy::HeuristicRelevance => "heuristic_relevance",
            Strategy::SiteSpecific => "site_specific",
        }
    }

    /// Declared precision of the strategy's output.
    pub fn reliability(&self) -> f32 {
        match self {
            Strategy::Structural => 0.9,
            Strategy::RegexFallback => 0.7,
            Strategy::TextExtraction => 0.5,
            Strategy::HeuristicRelevance => 0.8,
            Strategy::SiteSpecific => 0.6,
        }
    }

    /// Run this strategy over sanitized HTML.
    pub fn attempt(&self, html: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<Record>, StrategyError> {
        match self {
            Strategy::Structural => structural::extract(html, ctx),
            Strategy::RegexFallback => regex_fallback::extract(html, ctx),
            Strategy::TextExtraction => text::extract(html, ctx),
            Strategy::HeuristicRelevance => heuristic::extract(html, ctx),
            Strategy::SiteSpecific => site_specific::extract(html, ctx),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Record of one strategy run, in the order the chain ran them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    pub name: String,
    pub success: bool,
    pub records_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the chain produced.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    /// Output of the winning strategy, empty if none won
    pub records: Vec<Record>,
    pub attempts: Vec<StrategyAttempt>,
    pub winner: Option<Strategy>,
}

/// Ordered list of strategies; the first to produce records wins.
#[derive(Debug, Clone)]
pub struct StrategyChain {
    strategies: Vec<Strategy>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Try each strategy in order. Records with no fields are dropped before
    /// deciding whether a strategy succeeded, and results are never merged
    /// across strategies.
    pub fn run(&self, html: &str, ctx: &ExtractionContext<'_>) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();

        for strategy in &self.strategies {
            match strategy.attempt(html, ctx) {
                Ok(records) => {
                    let records: Vec<Record> = records.into_iter().filter(|r| !r.is_empty()).collect();
                    let success = !records.is_empty();
                    debug!(strategy = strategy.name(), records = records.len(), "strategy finished");

                    outcome.attempts.push(StrategyAttempt {
                        name: strategy.name().to_string(),
                        success,
                        records_found: records.len(),
                        error: None,
                    });

                    if success {
                        outcome.records = records;
                        outcome.winner = Some(*strategy);
                        return outcome;
                    }
                }
                Err(e) => {
                    debug!(strategy = strategy.name(), error = %e, "strategy failed");
                    outcome.attempts.push(StrategyAttempt {
                        name: strategy.name().to_string(),
                        success: false,
                        records_found: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcome
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new(Strategy::PRIORITY.to_vec())
    }
}

/// Field for a free-form key or column label such as `closeDate`,
/// `Award Ceiling` or `Issuing Agency`.
pub(crate) fn field_for_label(label: &str, content_type: ContentType) -> Option<&'static str> {
    let key: String = label.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect();
    if key.is_empty() {
        return None;
    }

    let role = if key.contains("title") || key == "name" {
        FieldRole::Title
    } else if ["deadline", "closedate", "closingdate", "duedate", "responsedate", "closes", "due"]
        .iter()
        .any(|k| key.contains(k))
    {
        FieldRole::Deadline
    } else if ["agency", "department", "sponsor", "funder", "office", "organization", "issuedby"]
        .iter()
        .any(|k| key.contains(k))
    {
        FieldRole::Agency
    } else if key.ends_with("name") {
        FieldRole::Title
    } else if ["amount", "ceiling", "value", "funding", "award", "budget", "total"]
        .iter()
        .any(|k| key.contains(k))
    {
        FieldRole::Amount
    } else if ["description", "synopsis", "summary", "abstract"].iter().any(|k| key.contains(k)) {
        FieldRole::Description
    } else if ["eligib", "setaside", "applicant"].iter().any(|k| key.contains(k)) {
        FieldRole::Eligibility
    } else {
        return None;
    };

    Some(content_type.field(role))
}
