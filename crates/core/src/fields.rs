//! Field mapping: cleaning raw fragments into record values.
//!
//! Every strategy funnels candidate values through [`clean_value`] before
//! they land in a [`Record`], so a record never holds markup, entity
//! references, runs of whitespace or empty strings.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z][a-zA-Z0-9]{1,31});").expect("entity pattern"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// US-dollar amounts: `$50,000`, `$1.5 million`, `$ 250K`.
pub(crate) static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?\d+(?:,\d{3})*(?:\.\d{1,2})?(?:\s?(?:[Mm]illion|[Bb]illion|[Tt]housand|[MKB])\b)?")
        .expect("currency pattern")
});

/// Numeric and month-name dates: `12/31/2025`, `2025-12-31`, `March 2025`, `Dec. 31, 2025`.
pub(crate) static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2}|(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(?:\d{1,2}(?:st|nd|rd|th)?,?\s+)?\d{4})\b",
    )
    .expect("date pattern")
});

/// Cleans a raw fragment into a field value.
///
/// Strips tags, replaces every entity reference with a space, collapses
/// whitespace and trims. Returns `None` when nothing is left.
pub fn clean_value(raw: &str) -> Option<String> {
    let without_tags = TAG.replace_all(raw, " ");
    let without_entities = ENTITY.replace_all(&without_tags, " ");
    let collapsed = WHITESPACE.replace_all(&without_entities, " ");
    let trimmed = collapsed.trim();

    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// One structured result row, keyed by field name.
///
/// Values are always cleaned and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cleans `raw` and stores it under `field`, replacing any previous value.
    ///
    /// Returns `false` (and stores nothing) when the cleaned value is empty.
    pub fn set(&mut self, field: &str, raw: &str) -> bool {
        match clean_value(raw) {
            Some(value) => {
                self.0.insert(field.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Like [`Record::set`], but keeps an existing value.
    pub fn set_if_absent(&mut self, field: &str, raw: &str) -> bool {
        if self.0.contains_key(field) {
            return false;
        }
        self.set(field, raw)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, raw) in iter {
            record.set(field.as_ref(), raw.as_ref());
        }
        record
    }
}

/// Title of a text chunk: its first sentence longer than 10 characters.
pub(crate) fn first_sentence(text: &str) -> Option<&str> {
    text.split(['.', '!', '?', '\n', '|'])
        .map(str::trim)
        .find(|sentence| sentence.chars().count() > 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_value_strips_tags_and_whitespace() {
        assert_eq!(
            clean_value("  <b>Ocean</b>\n\t <i>Grant</i>  "),
            Some("Ocean Grant".to_string())
        );
    }

    #[test]
    fn test_clean_value_entities() {
        assert_eq!(clean_value("Fish &amp; Wildlife"), Some("Fish Wildlife".to_string()));
        assert_eq!(clean_value("Due&nbsp;Friday"), Some("Due Friday".to_string()));
        assert_eq!(clean_value("A&bogus;B"), Some("A B".to_string()));
        assert_eq!(clean_value("&#36;50,000"), Some("50,000".to_string()));
        assert_eq!(clean_value("&#x41;BC"), Some("BC".to_string()));
        assert_eq!(clean_value("R&D grants"), Some("R&D grants".to_string()));
    }

    #[test]
    fn test_clean_value_empty() {
        assert_eq!(clean_value("   "), None);
        assert_eq!(clean_value("<br/><span></span>"), None);
        assert_eq!(clean_value("&nbsp;"), None);
    }

    #[test]
    fn test_record_omits_empty_values() {
        let mut record = Record::new();
        assert!(!record.set("title", "  "));
        assert!(record.is_empty());
        assert!(record.set("title", "<td>Ocean Grant</td>"));
        assert_eq!(record.get("title"), Some("Ocean Grant"));
    }

    #[test]
    fn test_record_set_if_absent_keeps_first() {
        let mut record = Record::new();
        record.set_if_absent("deadline", "March 2025");
        record.set_if_absent("deadline", "April 2025");
        assert_eq!(record.get("deadline"), Some("March 2025"));
    }

    #[test]
    fn test_record_serializes_as_map() {
        let record: Record = [("title", "Ocean Grant"), ("amount", "$50,000")].into_iter().collect();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Ocean Grant");
        assert_eq!(json["amount"], "$50,000");
    }

    #[test]
    fn test_currency_pattern() {
        let m = CURRENCY.find("total $50,000, paid yearly").unwrap();
        assert_eq!(m.as_str(), "$50,000");
        let m = CURRENCY.find("up to $1.5 million").unwrap();
        assert_eq!(m.as_str(), "$1.5 million");
    }

    #[test]
    fn test_date_pattern() {
        assert_eq!(DATE.find("due 12/31/2025").unwrap().as_str(), "12/31/2025");
        assert_eq!(DATE.find("deadline March 2025 amount").unwrap().as_str(), "March 2025");
        assert_eq!(DATE.find("closes Dec. 31, 2025").unwrap().as_str(), "Dec. 31, 2025");
        assert!(DATE.find("no dates here").is_none());
    }

    #[test]
    fn test_first_sentence() {
        assert_eq!(
            first_sentence("Short. Coastal Resilience Grant program. More text"),
            Some("Coastal Resilience Grant program")
        );
        assert_eq!(first_sentence("tiny. bits"), None);
    }
}
