//! HTML repair for markup that browsers tolerate and parsers do not.
//!
//! [`Sanitizer::sanitize`] runs a fixed sequence of detectors. Each one
//! inspects the document, and when it fires, repairs it and appends an
//! [`IssueReport`]. Repairs are cumulative: every detector works on the
//! output of the previous one. A final normalization pass fixes line
//! endings, tabs, non-breaking spaces and runs of blank lines.
//!
//! The output is a fixed point: sanitizing it again reports nothing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Elements whose balance is tracked at end of input.
const TRACKED_TAGS: [&str; 6] = ["table", "tr", "td", "div", "span", "p"];

/// Elements closed by the malformed-tags pass.
const CELL_AND_BLOCK_TAGS: [&str; 4] = ["td", "div", "span", "p"];

/// Elements closed by the broken-tables pass.
const TABLE_TAGS: [&str; 2] = ["table", "tr"];

static TAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)([a-z][a-z0-9]*)\b[^<>]*?(/?)>").expect("tag token pattern"));

/// C0 and C1 controls, except tab, newline and carriage return.
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x9F]").expect("control char pattern"));

static FORM_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(/?)form\b[^<>]*>").expect("form pattern"));

static NBSP_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)&nbsp;").expect("nbsp pattern"));

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern"));

/// Category of a detected markup problem. Reports are listed in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueType {
    MalformedTags,
    InvalidCharacters,
    BrokenTables,
    NestedForms,
}

impl IssueType {
    /// Name as it appears in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MalformedTags => "malformedTags",
            IssueType::InvalidCharacters => "invalidCharacters",
            IssueType::BrokenTables => "brokenTables",
            IssueType::NestedForms => "nestedForms",
        }
    }
}

/// What a detector found and what it did about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    pub issue_type: IssueType,
    pub pattern_matched: String,
    pub fixes_applied: Vec<String>,
}

/// Repaired HTML plus the issues found while repairing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedDocument {
    pub html: String,
    pub issues_found: Vec<IssueReport>,
}

/// The detect-and-correct pipeline.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer;

impl Sanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Sanitizes an HTML string. Never fails.
    pub fn sanitize(&self, html: &str) -> SanitizedDocument {
        let mut current = html.to_string();
        let mut issues_found = Vec::new();

        for detector in Detector::PIPELINE {
            if let Some(report) = detector.run(html, &mut current) {
                tracing::debug!(
                    issue = ?report.issue_type,
                    pattern = %report.pattern_matched,
                    fixes = report.fixes_applied.len(),
                    "sanitizer detector fired"
                );
                issues_found.push(report);
            }
        }

        issues_found.sort_by_key(|report| report.issue_type);
        SanitizedDocument { html: normalize(&current), issues_found }
    }

    /// Sanitizes arbitrary bytes, replacing invalid UTF-8 sequences.
    pub fn sanitize_bytes(&self, bytes: &[u8]) -> SanitizedDocument {
        self.sanitize(&String::from_utf8_lossy(bytes))
    }
}

/// Detectors in pipeline order.
///
/// Control characters go first: stripping them can turn text such as
/// `<\u{1}div>` into a tag, which the tag passes must then see.
#[derive(Debug, Clone, Copy)]
enum Detector {
    InvalidCharacters,
    MalformedTags,
    BrokenTables,
    NestedForms,
}

impl Detector {
    const PIPELINE: [Detector; 4] = [
        Detector::InvalidCharacters,
        Detector::MalformedTags,
        Detector::BrokenTables,
        Detector::NestedForms,
    ];

    fn run(self, original: &str, current: &mut String) -> Option<IssueReport> {
        match self {
            Detector::InvalidCharacters => strip_control_chars(current),
            Detector::MalformedTags => repair_malformed_tags(current),
            Detector::BrokenTables => close_broken_tables(original, current),
            Detector::NestedForms => flatten_nested_forms(current),
        }
    }
}

fn strip_control_chars(html: &mut String) -> Option<IssueReport> {
    let count = CONTROL_CHARS.find_iter(html).count();
    if count == 0 {
        return None;
    }

    *html = CONTROL_CHARS.replace_all(html, "").into_owned();

    Some(IssueReport {
        issue_type: IssueType::InvalidCharacters,
        pattern_matched: "C0/C1 control characters".to_string(),
        fixes_applied: vec![format!("stripped {} control character(s)", count)],
    })
}

fn repair_malformed_tags(html: &mut String) -> Option<IssueReport> {
    let (stripped, removed) = strip_unterminated_attributes(html);
    let unclosed: Vec<&str> = open_elements(&stripped)
        .into_iter()
        .filter(|tag| CELL_AND_BLOCK_TAGS.contains(tag))
        .collect();

    if removed.is_empty() && unclosed.is_empty() {
        return None;
    }

    let mut patterns = Vec::new();
    if !removed.is_empty() {
        patterns.push(format!("unterminated attribute quotes ({})", removed.len()));
    }
    if !unclosed.is_empty() {
        patterns.push(format!("unclosed {}", describe_tags(&unclosed)));
    }

    let mut fixes: Vec<String> = removed.iter().map(|attr| format!("stripped attribute {}", attr)).collect();
    *html = stripped;
    fixes.extend(close_open_elements(html, &CELL_AND_BLOCK_TAGS));

    Some(IssueReport { issue_type: IssueType::MalformedTags, pattern_matched: patterns.join("; "), fixes_applied: fixes })
}

fn close_broken_tables(original: &str, html: &mut String) -> Option<IssueReport> {
    let mut unclosed: Vec<&str> = open_elements(original)
        .into_iter()
        .filter(|tag| TABLE_TAGS.contains(tag))
        .collect();
    if unclosed.is_empty() {
        unclosed = open_elements(html)
            .into_iter()
            .filter(|tag| TABLE_TAGS.contains(tag))
            .collect();
    }

    if unclosed.is_empty() {
        return None;
    }

    Some(IssueReport {
        issue_type: IssueType::BrokenTables,
        pattern_matched: format!("unclosed {}", describe_tags(&unclosed)),
        fixes_applied: close_open_elements(html, &TABLE_TAGS),
    })
}

fn flatten_nested_forms(html: &mut String) -> Option<IssueReport> {
    let mut output = String::with_capacity(html.len());
    let mut depth = 0usize;
    let mut removed_open = 0usize;
    let mut removed_close = 0usize;
    let mut last = 0;

    for caps in FORM_TAG.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        let closing = !caps[1].is_empty();

        let remove = if closing {
            let nested = depth > 1;
            depth = depth.saturating_sub(1);
            if nested {
                removed_close += 1;
            }
            nested
        } else {
            depth += 1;
            if depth > 1 {
                removed_open += 1;
            }
            depth > 1
        };

        if remove {
            output.push_str(&html[last..whole.start()]);
            last = whole.end();
        }
    }

    if removed_open == 0 && removed_close == 0 {
        return None;
    }

    output.push_str(&html[last..]);
    *html = output;

    let mut fixes = Vec::new();
    if removed_open > 0 {
        fixes.push(format!("removed {} nested <form> opening tag(s)", removed_open));
    }
    if removed_close > 0 {
        fixes.push(format!("removed {} nested </form> closing tag(s)", removed_close));
    }

    Some(IssueReport {
        issue_type: IssueType::NestedForms,
        pattern_matched: "<form> opened inside an unclosed <form>".to_string(),
        fixes_applied: fixes,
    })
}

/// Tracked elements still open at end of input, outermost first.
fn open_elements(html: &str) -> Vec<&'static str> {
    let mut stack: Vec<&'static str> = Vec::new();

    for caps in TAG_TOKEN.captures_iter(html) {
        let name = caps[2].to_ascii_lowercase();
        let Some(tag) = TRACKED_TAGS.iter().copied().find(|t| *t == name) else {
            continue;
        };

        if !caps[1].is_empty() {
            if let Some(pos) = stack.iter().rposition(|open| *open == tag) {
                stack.truncate(pos);
            }
        } else if caps[3].is_empty() {
            stack.push(tag);
        }
    }

    stack
}

/// Appends closing tags until no element from `owned` is left open.
///
/// Elements nested inside an owned element are closed too, innermost first.
fn close_open_elements(html: &mut String, owned: &[&str]) -> Vec<String> {
    let mut stack = open_elements(html);
    let Some(lowest) = stack.iter().position(|tag| owned.contains(tag)) else {
        return Vec::new();
    };

    let to_close = stack.split_off(lowest);
    to_close
        .iter()
        .rev()
        .map(|tag| {
            html.push_str("</");
            html.push_str(tag);
            html.push('>');
            format!("appended </{}>", tag)
        })
        .collect()
}

fn describe_tags(tags: &[&str]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for tag in tags {
        if !seen.contains(tag) {
            seen.push(tag);
        }
    }
    seen.iter().map(|t| format!("<{}>", t)).collect::<Vec<_>>().join(", ")
}

/// Removes attributes whose quoted value never closes.
///
/// A quote is unterminated when no matching quote appears before the next
/// `<` or the end of input. The attribute is removed up to the tag's `>`
/// (or the next `<`). Returns the repaired HTML and the removed text.
fn strip_unterminated_attributes(html: &str) -> (String, Vec<String>) {
    let bytes = html.as_bytes();
    let len = bytes.len();
    let mut output = String::with_capacity(len);
    let mut removed = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < len {
        if bytes[i] != b'<' || !bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < len && bytes[j].is_ascii_alphanumeric() {
            j += 1;
        }

        loop {
            while j < len && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j >= len || bytes[j] == b'>' || bytes[j] == b'<' {
                break;
            }

            let attr_start = j;
            while j < len && !bytes[j].is_ascii_whitespace() && !matches!(bytes[j], b'=' | b'>' | b'<' | b'/') {
                j += 1;
            }
            if j == attr_start {
                // stray '=' or '/'
                j += 1;
                continue;
            }

            let mut k = j;
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k >= len || bytes[k] != b'=' {
                continue;
            }
            k += 1;
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }

            match bytes.get(k) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let value_start = k + 1;
                    let closing = bytes[value_start..]
                        .iter()
                        .position(|&b| b == quote || b == b'<')
                        .map(|offset| value_start + offset)
                        .filter(|&pos| bytes[pos] == quote);

                    match closing {
                        Some(pos) => j = pos + 1,
                        None => {
                            let end = bytes[value_start..]
                                .iter()
                                .position(|&b| b == b'>' || b == b'<')
                                .map_or(len, |offset| value_start + offset);
                            output.push_str(&html[copied..attr_start]);
                            removed.push(html[attr_start..end].to_string());
                            copied = end;
                            j = end;
                        }
                    }
                }
                _ => {
                    j = k;
                    while j < len && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' && bytes[j] != b'<' {
                        j += 1;
                    }
                }
            }
        }

        i = j.max(i + 1);
    }

    output.push_str(&html[copied..]);
    (output, removed)
}

/// Line endings to LF, tabs to four spaces, non-breaking spaces to spaces,
/// three or more newlines down to two.
fn normalize(html: &str) -> String {
    let unified = html.replace("\r\n", "\n").replace('\r', "\n").replace('\u{a0}', " ");
    let spaced = NBSP_ENTITY.replace_all(&unified, " ").replace('\t', "    ");
    EXCESS_NEWLINES.replace_all(&spaced, "\n\n").into_owned()
}
