//! Content types and the field schema each one extracts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Semantic role of a field, independent of the name a content type gives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Title,
    Agency,
    Deadline,
    Amount,
    Description,
    Eligibility,
}

/// Keywords that mark a `<div>` as a record container in the structural scan.
pub const CONTAINER_KEYWORDS: [&str; 4] = ["grant", "contract", "funding", "opportunity"];

/// The kind of record being extracted.
///
/// Selects the field list, relevance keywords and regex-fallback patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Grants,
    Contracts,
    Funding,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Grants, ContentType::Contracts, ContentType::Funding];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Grants => "grants",
            ContentType::Contracts => "contracts",
            ContentType::Funding => "funding",
        }
    }

    /// Field name used for a role.
    pub fn field(&self, role: FieldRole) -> &'static str {
        match (self, role) {
            (_, FieldRole::Title) => "title",
            (ContentType::Funding, FieldRole::Agency) => "sponsor",
            (_, FieldRole::Agency) => "agency",
            (_, FieldRole::Deadline) => "deadline",
            (ContentType::Contracts, FieldRole::Amount) => "value",
            (_, FieldRole::Amount) => "amount",
            (_, FieldRole::Description) => "description",
            (ContentType::Contracts, FieldRole::Eligibility) => "set_aside",
            (_, FieldRole::Eligibility) => "eligibility",
        }
    }

    /// Fields in table-column order, as the structural strategy maps cells.
    pub fn positional_fields(&self) -> [&'static str; 4] {
        [
            self.field(FieldRole::Title),
            self.field(FieldRole::Agency),
            self.field(FieldRole::Deadline),
            self.field(FieldRole::Amount),
        ]
    }

    /// Every field this content type can populate.
    pub fn fields(&self) -> [&'static str; 6] {
        [
            self.field(FieldRole::Title),
            self.field(FieldRole::Agency),
            self.field(FieldRole::Deadline),
            self.field(FieldRole::Amount),
            self.field(FieldRole::Description),
            self.field(FieldRole::Eligibility),
        ]
    }

    /// Lowercase keywords that make a block of text relevant to this content type.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            ContentType::Grants => &["grant", "funding", "opportunity", "award", "assistance", "cfda", "fellowship"],
            ContentType::Contracts => &[
                "contract",
                "solicitation",
                "procurement",
                "rfp",
                "rfq",
                "bid",
                "award",
                "tender",
            ],
            ContentType::Funding => &["funding", "opportunity", "grant", "program", "initiative", "award", "loan"],
        }
    }

    /// Regex-fallback patterns, in order: title, deadline, amount, agency.
    ///
    /// Each pattern needs an explicit `label:` at the start of a line or
    /// right after a tag, and captures the value in group 1.
    pub fn fallback_patterns(&self) -> [&'static str; 4] {
        match self {
            ContentType::Grants => [
                r"(?im)(?:^|>)\s*(?:grant|opportunity|program|funding)?\s*(?:title|name)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{3,200})",
                r"(?im)(?:^|>)\s*(?:deadline|due\s+date|closing\s+date|close\s+date|applications?\s+due)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{4,60})",
                r"(?im)(?:^|>)\s*(?:award\s+ceiling|award\s+amount|total\s+funding|amount)\s*:\s*(?:</?[a-z][^>]*>\s*)*(\$?\s?\d[\d,.]*(?:\s*(?:million|billion|thousand))?)",
                r"(?im)(?:^|>)\s*(?:agency|department|issued\s+by)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{3,120})",
            ],
            ContentType::Contracts => [
                r"(?im)(?:^|>)\s*(?:solicitation|contract|notice)?\s*(?:title|name)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{3,200})",
                r"(?im)(?:^|>)\s*(?:response\s+deadline|offers\s+due|proposals?\s+due|deadline|due\s+date)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{4,60})",
                r"(?im)(?:^|>)\s*(?:estimated\s+value|contract\s+value|ceiling|value|amount)\s*:\s*(?:</?[a-z][^>]*>\s*)*(\$?\s?\d[\d,.]*(?:\s*(?:million|billion|thousand))?)",
                r"(?im)(?:^|>)\s*(?:contracting\s+office|agency|department|office)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{3,120})",
            ],
            ContentType::Funding => [
                r"(?im)(?:^|>)\s*(?:opportunity|program|initiative)?\s*(?:title|name)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{3,200})",
                r"(?im)(?:^|>)\s*(?:deadline|due\s+date|closing\s+date|letters?\s+of\s+intent\s+due)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{4,60})",
                r"(?im)(?:^|>)\s*(?:funding\s+amount|award\s+size|award|amount)\s*:\s*(?:</?[a-z][^>]*>\s*)*(\$?\s?\d[\d,.]*(?:\s*(?:million|billion|thousand))?)",
                r"(?im)(?:^|>)\s*(?:sponsor|funder|foundation|agency)\s*:\s*(?:</?[a-z][^>]*>\s*)*([^<\n]{3,120})",
            ],
        }
    }

    /// Whether lowercase text mentions any relevance keyword.
    pub fn is_relevant(&self, lowercase_text: &str) -> bool {
        self.keywords().iter().any(|kw| lowercase_text.contains(kw))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grants" | "grant" => Ok(Self::Grants),
            "contracts" | "contract" => Ok(Self::Contracts),
            "funding" => Ok(Self::Funding),
            _ => Err(format!("Invalid content type: {}. Valid options: grants, contracts, funding", s)),
        }
    }
}
