use crate::content::FieldRole;
use crate::result::ParseResult;
use std::fmt::Write;

/// Configuration for plain text output
#[derive(Debug, Clone, Default)]
pub struct TextConfig {
    /// List every strategy that ran
    pub include_attempts: bool,

    /// List the sanitizer's issue reports
    pub include_issues: bool,

    /// Wrap field values at specified width (0 = no wrapping)
    pub line_width: usize,
}

/// Plain text formatter for human-readable reports
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    config: TextConfig,
}

impl TextFormatter {
    pub fn new(config: TextConfig) -> Self {
        Self { config }
    }

    pub fn convert(&self, result: &ParseResult) -> String {
        to_text(result, &self.config)
    }
}

/// Render a parse result as a report: a summary header, one block per
/// record, then the optional attempt and issue listings.
pub fn to_text(result: &ParseResult, config: &TextConfig) -> String {
    let mut output = generate_header(result);

    let title_field = result.content_type.field(FieldRole::Title);
    for (index, record) in result.records.iter().enumerate() {
        let title = record.get(title_field).unwrap_or("(untitled)");
        let _ = writeln!(output, "\n[{}] {}", index + 1, title);

        let fields: Vec<(&str, &str)> = record.iter().filter(|(field, _)| *field != title_field).collect();
        let key_width = fields.iter().map(|(field, _)| field.len()).max().unwrap_or(0);
        for (field, value) in fields {
            let label = format!("    {:<width$}  ", format!("{field}:"), width = key_width + 1);
            output.push_str(&indent_value(&label, value, config.line_width));
            output.push('\n');
        }
    }

    if config.include_attempts && !result.strategies_attempted.is_empty() {
        output.push_str("\nStrategies:\n");
        for attempt in &result.strategies_attempted {
            let status = if attempt.success {
                format!("ok, {} record(s)", attempt.records_found)
            } else if let Some(error) = &attempt.error {
                format!("failed ({error})")
            } else {
                "no records".to_string()
            };
            let _ = writeln!(output, "  {}: {}", attempt.name, status);
        }
    }

    if config.include_issues && !result.issues.is_empty() {
        output.push_str("\nIssues:\n");
        for issue in &result.issues {
            let _ = writeln!(
                output,
                "  {}: {} ({} fix(es))",
                issue.issue_type.as_str(),
                issue.pattern_matched,
                issue.fixes_applied.len()
            );
        }
    }

    output.trim_end().to_string()
}

/// Summary lines for the top of a report
fn generate_header(result: &ParseResult) -> String {
    let mut header = String::new();

    let source = if result.url.is_empty() { "(inline html)" } else { result.url.as_str() };
    let _ = writeln!(header, "{} [{}]", source, result.content_type);

    let mut summary = format!("{} record(s)", result.records.len());
    if let Some(strategy) = result.winning_strategy() {
        let _ = write!(summary, " via {strategy}");
    }
    let _ = write!(summary, " in {} ms", result.processing_time_ms);
    if result.cached {
        summary.push_str(" (cached)");
    }
    header.push_str(&summary);
    header.push('\n');

    if let Some(error) = &result.error {
        let _ = writeln!(header, "Error: {error}");
    }

    header
}

/// `label` followed by `value`, continuation lines aligned under the value.
fn indent_value(label: &str, value: &str, width: usize) -> String {
    let available = width.saturating_sub(label.len());
    if width == 0 || available < 10 {
        return format!("{label}{value}");
    }

    let words: Vec<&str> = value.split_whitespace().collect();
    let pad = " ".repeat(label.len());
    let wrapped = wrap_words(&words, available);

    let mut lines = wrapped.lines();
    let mut out = format!("{label}{}", lines.next().unwrap_or_default());
    for line in lines {
        let _ = write!(out, "\n{pad}{line}");
    }
    out
}

/// Wrap a slice of words to specified width
fn wrap_words(words: &[&str], width: usize) -> String {
    let mut lines = Vec::new();
    let mut current_line = Vec::new();
    let mut current_length = 0;

    for &word in words {
        let word_len = word.chars().count();

        if current_length == 0 {
            current_line.push(word);
            current_length = word_len;
        } else if current_length + 1 + word_len <= width {
            current_length += 1 + word_len;
            current_line.push(word);
        } else {
            lines.push(current_line.join(" "));
            current_line = vec![word];
            current_length = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line.join(" "));
    }

    lines.join("\n")
}
