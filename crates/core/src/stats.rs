//! Process-wide parse counters.
//!
//! Recording never feeds back into extraction; a [`Stats`] can be shared
//! behind an `Arc` and read at any time through [`Stats::snapshot`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::result::ParseResult;
use crate::strategy::Strategy;

#[derive(Debug, Default)]
pub struct Stats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fetch_attempts: AtomicU64,
    fetch_failures: AtomicU64,
    successful_parses: AtomicU64,
    failed_parses: AtomicU64,
    fallback_parses: AtomicU64,
    strategy_wins: [AtomicU64; Strategy::PRIORITY.len()],
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetch_attempts: u64,
    pub fetch_failures: u64,
    pub successful_parses: u64,
    pub failed_parses: u64,
    /// Parses won by any strategy after the first
    pub fallback_parses: u64,
    pub strategy_wins: BTreeMap<String, u64>,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        bump(&self.requests, 1);
    }

    pub fn record_cache(&self, hit: bool) {
        bump(if hit { &self.cache_hits } else { &self.cache_misses }, 1);
    }

    /// One fetch: how many attempts it took and whether it got a page.
    pub fn record_fetch(&self, attempts: u32, success: bool) {
        bump(&self.fetch_attempts, u64::from(attempts));
        if !success {
            bump(&self.fetch_failures, 1);
        }
    }

    /// Outcome of a freshly computed parse. Cache hits are not parses.
    pub fn record_parse(&self, result: &ParseResult) {
        if !result.success {
            bump(&self.failed_parses, 1);
            return;
        }
        bump(&self.successful_parses, 1);

        let winner = result
            .winning_strategy()
            .and_then(|name| Strategy::PRIORITY.iter().position(|s| s.name() == name));
        if let Some(index) = winner {
            bump(&self.strategy_wins[index], 1);
            if index > 0 {
                bump(&self.fallback_parses, 1);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        StatsSnapshot {
            requests: load(&self.requests),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            fetch_attempts: load(&self.fetch_attempts),
            fetch_failures: load(&self.fetch_failures),
            successful_parses: load(&self.successful_parses),
            failed_parses: load(&self.failed_parses),
            fallback_parses: load(&self.fallback_parses),
            strategy_wins: Strategy::PRIORITY
                .iter()
                .zip(&self.strategy_wins)
                .map(|(strategy, wins)| (strategy.name().to_string(), load(wins)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentType;
    use crate::fields::Record;
    use crate::result::Aggregator;
    use crate::strategy::{ChainOutcome, StrategyAttempt};

    fn won_by(names: &[&str]) -> ParseResult {
        let attempts = names
            .iter()
            .enumerate()
            .map(|(i, name)| StrategyAttempt {
                name: name.to_string(),
                success: i + 1 == names.len(),
                records_found: usize::from(i + 1 == names.len()),
                error: None,
            })
            .collect();
        let record: Record = [("title", "Ocean Grant")].into_iter().collect();
        Aggregator::start("https://www.epa.gov/", ContentType::Grants).finish(ChainOutcome {
            records: vec![record],
            attempts,
            winner: None,
        })
    }

    #[test]
    fn test_wins_and_fallbacks() {
        let stats = Stats::new();
        stats.record_parse(&won_by(&["structural"]));
        stats.record_parse(&won_by(&["structural", "regex_fallback", "text_extraction"]));

        let failed = Aggregator::start("https://x.gov/", ContentType::Grants).finish(ChainOutcome::default());
        stats.record_parse(&failed);

        let snap = stats.snapshot();
        assert_eq!(snap.successful_parses, 2);
        assert_eq!(snap.failed_parses, 1);
        assert_eq!(snap.fallback_parses, 1);
        assert_eq!(snap.strategy_wins["structural"], 1);
        assert_eq!(snap.strategy_wins["text_extraction"], 1);
        assert_eq!(snap.strategy_wins["site_specific"], 0);
        assert_eq!(snap.strategy_wins.len(), 5);
    }

    #[test]
    fn test_fetch_and_cache_counters() {
        let stats = Stats::new();
        stats.record_request();
        stats.record_cache(false);
        stats.record_fetch(3, false);
        stats.record_request();
        stats.record_cache(true);

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!((snap.cache_hits, snap.cache_misses), (1, 1));
        assert_eq!((snap.fetch_attempts, snap.fetch_failures), (3, 1));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["fetchAttempts"], 3);
        assert_eq!(json["strategyWins"]["structural"], 0);
    }
}
