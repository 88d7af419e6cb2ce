//! Heuristic relevance scoring.
//!
//! The page is cut into chunks at every `<tr`, `<div` and `<section`. Each
//! chunk scores one point per keyword occurrence, two for a currency amount
//! and one for a date; chunks scoring above [`THRESHOLD`] become records.

use std::sync::LazyLock;

use regex::Regex;

use crate::content::{ContentType, FieldRole};
use crate::error::StrategyError;
use crate::fields::{CURRENCY, DATE, Record, clean_value, first_sentence};
use crate::strategy::ExtractionContext;

static CHUNK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:tr|div|section)\b").expect("chunk boundary pattern"));

/// Minimum score (exclusive) for a chunk to count as a record.
pub const THRESHOLD: u32 = 2;

const MAX_TITLE_CHARS: usize = 200;

pub fn extract(html: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<Record>, StrategyError> {
    Ok(chunks(html)
        .filter_map(clean_value)
        .filter(|text| score(text, ctx.content_type) > THRESHOLD)
        .map(|text| chunk_record(&text, ctx.content_type))
        .filter(|record| !record.is_empty())
        .collect())
}

/// Split at the start of every chunk tag; text before the first tag is a chunk too.
fn chunks(html: &str) -> impl Iterator<Item = &str> {
    let mut starts: Vec<usize> = CHUNK_START.find_iter(html).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    let ends: Vec<usize> = starts.iter().skip(1).copied().chain(std::iter::once(html.len())).collect();

    starts.into_iter().zip(ends).map(move |(start, end)| &html[start..end])
}

/// Relevance of a chunk's cleaned text.
pub fn score(text: &str, content_type: ContentType) -> u32 {
    let lower = text.to_lowercase();
    let keyword_hits: usize = content_type.keywords().iter().map(|kw| lower.matches(kw).count()).sum();

    let mut score = keyword_hits as u32;
    if CURRENCY.is_match(text) {
        score += 2;
    }
    if DATE.is_match(text) {
        score += 1;
    }
    score
}

fn chunk_record(text: &str, content_type: ContentType) -> Record {
    let mut record = Record::new();

    if let Some(sentence) = first_sentence(text) {
        let title: String = sentence.chars().take(MAX_TITLE_CHARS).collect();
        record.set(content_type.field(FieldRole::Title), &title);
    }
    if let Some(amount) = CURRENCY.find(text) {
        record.set(content_type.field(FieldRole::Amount), amount.as_str());
    }
    if let Some(date) = DATE.find(text) {
        record.set(content_type.field(FieldRole::Deadline), date.as_str());
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteProfile;

    fn run(html: &str, content_type: ContentType) -> Vec<Record> {
        let profile = SiteProfile::default();
        extract(html, &ExtractionContext::new(content_type, &profile)).unwrap()
    }

    #[test]
    fn test_score() {
        assert_eq!(score("Grant funding opportunity", ContentType::Grants), 3);
        assert_eq!(score("Grant of $5,000", ContentType::Grants), 3);
        assert_eq!(score("Grant closes 12/01/2025", ContentType::Grants), 2);
        assert_eq!(score("Weather report", ContentType::Grants), 0);
    }

    #[test]
    fn test_relevant_chunks_become_records() {
        let html = r#"
            <section>Site navigation and links</section>
            <div>Community Development Grant Award. Funds up to $300,000 for projects. Apply by 10/01/2026.</div>
            <div>Contact the webmaster.</div>"#;
        let records = run(html, ContentType::Grants);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("title"), Some("Community Development Grant Award"));
        assert_eq!(record.get("amount"), Some("$300,000"));
        assert_eq!(record.get("deadline"), Some("10/01/2026"));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let html = "<div>A grant program closing 01/02/2026 for towns</div>";
        assert_eq!(score("A grant program closing 01/02/2026 for towns", ContentType::Grants), 2);
        assert!(run(html, ContentType::Grants).is_empty());
    }

    #[test]
    fn test_title_truncated() {
        let long = "grant ".repeat(60);
        let records = run(&format!("<div>{long}</div>"), ContentType::Grants);
        assert_eq!(records[0].get("title").map(|t| t.chars().count()), Some(200));
    }

    #[test]
    fn test_chunks_cover_prefix_and_tags() {
        let parts: Vec<_> = chunks("intro<div>a</div><TR>b").collect();
        assert_eq!(parts, ["intro", "<div>a</div>", "<TR>b"]);
        let parts: Vec<_> = chunks("<section>x").collect();
        assert_eq!(parts, ["<section>x"]);
    }
}
