use crate::error::{ExtractError, Result};
use crate::profile::{SiteProfile, SiteRule};

/// A single line of a site profile file.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Domain substring; starts a new profile entry
    Pattern(String),

    /// Fetch behaviour
    Timeout(u64),
    Retries(u32),
    Encoding(String),

    /// Extraction rule for the site-specific strategy
    Rule(SiteRule),

    /// Extra request header
    HttpHeader(String, String),
}

/// Profile entry for one domain pattern. Unset values fall back to the default profile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileEntry {
    pub pattern: String,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub encoding: Option<String>,
    pub rule: Option<SiteRule>,
    pub http_headers: Vec<(String, String)>,
}

impl ProfileEntry {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into().to_lowercase(), ..Default::default() }
    }

    pub fn timeout_ms(mut self, value: u64) -> Self {
        self.timeout_ms = Some(value);
        self
    }

    pub fn max_retries(mut self, value: u32) -> Self {
        self.max_retries = Some(value);
        self
    }

    pub fn encoding(mut self, value: impl Into<String>) -> Self {
        self.encoding = Some(value.into());
        self
    }

    pub fn rule(mut self, value: SiteRule) -> Self {
        self.rule = Some(value);
        self
    }

    /// Apply a non-pattern directive to this entry
    pub fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Pattern(pattern) => self.pattern = pattern.to_lowercase(),
            Directive::Timeout(ms) => self.timeout_ms = Some(ms),
            Directive::Retries(n) => self.max_retries = Some(n),
            Directive::Encoding(label) => self.encoding = Some(label),
            Directive::Rule(rule) => self.rule = Some(rule),
            Directive::HttpHeader(name, value) => {
                if let Some(existing) = self.http_headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                    existing.1 = value;
                } else {
                    self.http_headers.push((name, value));
                }
            }
        }
    }

    /// Whether this entry applies to a (lowercase) host
    pub fn matches(&self, host: &str) -> bool {
        !self.pattern.is_empty() && host.contains(&self.pattern)
    }

    /// Resolve into a full profile, filling gaps from the default profile
    pub fn to_profile(&self) -> SiteProfile {
        let defaults = SiteProfile::default();
        SiteProfile {
            domain_pattern: self.pattern.clone(),
            encoding: self.encoding.clone().unwrap_or(defaults.encoding),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            rule: self.rule.unwrap_or(defaults.rule),
            http_headers: self.http_headers.clone(),
        }
    }
}

/// Parse a directive line from a profile file
pub fn parse_directive(line: &str) -> Result<Directive> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(ExtractError::ProfileError("Empty or comment line".to_string()));
    }

    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| ExtractError::ProfileError(format!("Invalid directive format: {}", line)))?;
    let key = key.trim();
    let value = value.trim();

    if value.is_empty() {
        return Err(ExtractError::ProfileError(format!("Missing value for directive: {}", key)));
    }

    match key {
        "pattern" => Ok(Directive::Pattern(value.to_string())),
        "timeout" => Ok(Directive::Timeout(parse_number(key, value)?)),
        "retries" => Ok(Directive::Retries(parse_number(key, value)?)),
        "encoding" => {
            if encoding_rs::Encoding::for_label(value.as_bytes()).is_none() {
                return Err(ExtractError::ProfileError(format!("Unknown encoding: {}", value)));
            }
            Ok(Directive::Encoding(value.to_lowercase()))
        }
        "rule" => value
            .parse::<SiteRule>()
            .map(Directive::Rule)
            .map_err(ExtractError::ProfileError),
        _ => {
            if let Some(header_name) = key.strip_prefix("http_header(").and_then(|s| s.strip_suffix(')')) {
                Ok(Directive::HttpHeader(header_name.to_string(), value.to_string()))
            } else {
                Err(ExtractError::ProfileError(format!("Unknown directive: {}", key)))
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| ExtractError::ProfileError(format!("Invalid number for {}: {}", key, value)))
}
