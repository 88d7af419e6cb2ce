//! Regex fallback: labelled values matched anywhere in the raw markup.
//!
//! Each content type has four patterns (title, deadline, amount, agency).
//! All matches of each pattern are collected into a list, and record `i`
//! combines the `i`th match of every list that has one.

use regex::Regex;

use crate::content::FieldRole;
use crate::error::StrategyError;
use crate::fields::{Record, clean_value};
use crate::strategy::ExtractionContext;

const ROLES: [FieldRole; 4] = [FieldRole::Title, FieldRole::Deadline, FieldRole::Amount, FieldRole::Agency];

pub fn extract(html: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<Record>, StrategyError> {
    let content_type = ctx.content_type;

    let mut columns: Vec<(&'static str, Vec<String>)> = Vec::with_capacity(ROLES.len());
    for (role, pattern) in ROLES.into_iter().zip(content_type.fallback_patterns()) {
        let regex = Regex::new(pattern)?;
        let values = regex
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| clean_value(m.as_str()))
            .collect();
        columns.push((content_type.field(role), values));
    }

    let longest = columns.iter().map(|(_, values)| values.len()).max().unwrap_or(0);

    Ok((0..longest)
        .map(|index| {
            columns
                .iter()
                .filter_map(|(field, values)| values.get(index).map(|value| (*field, value.as_str())))
                .collect::<Record>()
        })
        .filter(|record| !record.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentType;
    use crate::profile::SiteProfile;

    fn run(html: &str, content_type: ContentType) -> Vec<Record> {
        let profile = SiteProfile::default();
        extract(html, &ExtractionContext::new(content_type, &profile)).unwrap()
    }

    #[test]
    fn test_labelled_values_in_broken_markup() {
        let html = "<p>Grant Title: Watershed Restoration<br>Deadline: 09/15/2025<p>Award Amount: $75,000<p>Agency: USDA";
        let records = run(html, ContentType::Grants);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("title"), Some("Watershed Restoration"));
        assert_eq!(record.get("deadline"), Some("09/15/2025"));
        assert_eq!(record.get("amount"), Some("$75,000"));
        assert_eq!(record.get("agency"), Some("USDA"));
    }

    #[test]
    fn test_parallel_lists_merge_by_index() {
        let html = "Title: Alpha Program\nDeadline: 01/01/2026\nTitle: Beta Program\nTitle: Gamma Program\nDeadline: 02/02/2026";
        let records = run(html, ContentType::Grants);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("deadline"), Some("01/01/2026"));
        assert_eq!(records[1].get("title"), Some("Beta Program"));
        assert_eq!(records[1].get("deadline"), Some("02/02/2026"));
        assert_eq!(records[2].get("title"), Some("Gamma Program"));
        assert_eq!(records[2].get("deadline"), None);
    }

    #[test]
    fn test_wrapped_label() {
        let html = "<div><strong>Deadline:</strong> March 31, 2026</div>";
        let records = run(html, ContentType::Grants);
        assert_eq!(records[0].get("deadline"), Some("March 31, 2026"));
    }

    #[test]
    fn test_contract_and_funding_field_names() {
        let contracts = run("Estimated Value: $1.2 million", ContentType::Contracts);
        assert_eq!(contracts[0].get("value"), Some("$1.2 million"));

        let funding = run("Sponsor: Gates Foundation", ContentType::Funding);
        assert_eq!(funding[0].get("sponsor"), Some("Gates Foundation"));
    }

    #[test]
    fn test_labels_are_anchored() {
        let html = "<p>Grant Title: Salmon Habitat<br>Agency Name: NOAA<br>Deadline: 09/15/2025<p>Contact Name: Jane Doe";
        let records = run(html, ContentType::Grants);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("title"), Some("Salmon Habitat"));
        assert_eq!(records[0].get("deadline"), Some("09/15/2025"));
        assert_eq!(records[0].get("agency"), None);
    }

    #[test]
    fn test_labels_require_colon() {
        assert!(run("Research Funding Opportunity deadline March 2025 amount $10,000", ContentType::Grants).is_empty());
    }
}
