use crate::Result;
use crate::fields::Record;
use crate::result::ParseResult;
use serde::Serialize;
use serde_json::Value;

/// Configuration for JSON output
#[derive(Debug, Clone)]
pub struct JsonConfig {
    /// Pretty print JSON output
    pub pretty: bool,
    /// Include the sanitizer's issue reports
    pub include_issues: bool,
    /// Include the per-strategy attempt list
    pub include_attempts: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self { pretty: true, include_issues: true, include_attempts: true }
    }
}

/// Serialize a parse result.
///
/// Field names are camelCase, matching the result document exactly. Turning
/// off `include_issues` or `include_attempts` drops the whole key.
pub fn to_json(result: &ParseResult, config: &JsonConfig) -> Result<String> {
    let mut value = serde_json::to_value(result)?;

    if let Value::Object(map) = &mut value {
        if !config.include_issues {
            map.remove("issues");
        }
        if !config.include_attempts {
            map.remove("strategiesAttempted");
        }
    }

    render(&value, config.pretty)
}

/// Serialize only the records, as a JSON array.
pub fn records_to_json(records: &[Record], pretty: bool) -> Result<String> {
    render(records, pretty)
}

fn render<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let rendered = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    Ok(rendered)
}

/// JSON formatter with configurable options
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    config: JsonConfig,
}

impl JsonFormatter {
    pub fn new(config: JsonConfig) -> Self {
        Self { config }
    }

    pub fn convert(&self, result: &ParseResult) -> Result<String> {
        to_json(result, &self.config)
    }
}
