//! Text extraction: line-by-line scan of the page's visible text.
//!
//! Last resort for pages with no usable structure. A relevant line longer
//! than 10 characters starts a record; the lines after it fill in the
//! deadline, amount and agency until the next record starts.

use std::sync::LazyLock;

use regex::Regex;

use crate::content::{ContentType, FieldRole};
use crate::error::StrategyError;
use crate::fields::{CURRENCY, DATE, Record};
use crate::strategy::ExtractionContext;

static BLOCK_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|div|tr|li|ul|ol|h[1-6]|br|hr|table|thead|tbody|section|article|header|footer|dt|dd|form)\b[^>]*>")
        .expect("block boundary pattern")
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

static DEADLINE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:deadline|due|closing\s+date|close\s+date|closes|expires|submit\s+by)\b")
        .expect("deadline keyword pattern")
});

static AGENCY_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:agency|department|dept\.?|sponsor|sponsored\s+by|office|administration|issued\s+by)\b")
        .expect("agency keyword pattern")
});

/// A label that ends a title when it appears later on the same line.
static INLINE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:deadline|due|closing\s+date|closes|amount|award\s+ceiling|award\s+amount|estimated\s+value|value|agency|sponsor)\b",
    )
    .expect("inline label pattern")
});

/// A line that is a field of the current record rather than a new title.
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:application\s+|proposal\s+|response\s+)?(?:deadline|due|closing\s+date|close\s+date|closes|amount|award\s+(?:ceiling|amount|floor)|total\s+funding|funding\s+amount|estimated\s+value|value|agency|department|sponsor|office|issued\s+by)\b",
    )
    .expect("field line pattern")
});

const MAX_AGENCY_LEN: usize = 100;

pub fn extract(html: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<Record>, StrategyError> {
    let text = visible_text(html);
    let content_type = ctx.content_type;

    let mut records = Vec::new();
    let mut current: Option<Record> = None;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let lower = line.to_lowercase();

        if let Some(record) = current.as_mut()
            && FIELD_LINE.is_match(line)
        {
            attach_field(record, line, content_type);
            continue;
        }

        if content_type.is_relevant(&lower) && line.chars().count() > 10 {
            if let Some(done) = current.take()
                && !done.is_empty()
            {
                records.push(done);
            }
            current = Some(title_record(line, content_type));
        } else if let Some(record) = current.as_mut() {
            attach_field(record, line, content_type);
        }
    }

    if let Some(done) = current
        && !done.is_empty()
    {
        records.push(done);
    }

    Ok(records)
}

/// Record for a title line, with any deadline or amount given inline.
fn title_record(line: &str, content_type: ContentType) -> Record {
    let mut record = Record::new();

    let title = INLINE_LABEL
        .find(line)
        .map(|m| line[..m.start()].trim())
        .filter(|prefix| prefix.chars().count() > 10)
        .unwrap_or(line);
    record.set(content_type.field(FieldRole::Title), title);

    if let Some(keyword) = DEADLINE_KEYWORD.find(line)
        && let Some(date) = DATE.find(&line[keyword.end()..])
    {
        record.set(content_type.field(FieldRole::Deadline), date.as_str());
    }

    if let Some(amount) = CURRENCY.find(line) {
        record.set(content_type.field(FieldRole::Amount), amount.as_str());
    }

    record
}

/// Attach a follow-up line to the record it belongs to. Earlier values win.
fn attach_field(record: &mut Record, line: &str, content_type: ContentType) {
    if let Some(keyword) = DEADLINE_KEYWORD.find(line) {
        let rest = &line[keyword.end()..];
        let value = DATE.find(rest).map(|m| m.as_str()).unwrap_or_else(|| after_label(rest));
        record.set_if_absent(content_type.field(FieldRole::Deadline), value);
    } else if let Some(amount) = CURRENCY.find(line) {
        record.set_if_absent(content_type.field(FieldRole::Amount), amount.as_str());
    } else if AGENCY_KEYWORD.is_match(line) && line.chars().count() < MAX_AGENCY_LEN {
        let value = line.split_once(':').map(|(_, value)| value).unwrap_or(line);
        record.set_if_absent(content_type.field(FieldRole::Agency), value);
    }
}

fn after_label(rest: &str) -> &str {
    rest.trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
}

/// Plain text of a page, one line per block element.
pub(crate) fn visible_text(html: &str) -> String {
    let without_code = remove_non_content(html);
    let with_breaks = BLOCK_BOUNDARY.replace_all(&without_code, "\n");
    ANY_TAG.replace_all(&with_breaks, " ").into_owned()
}

/// Drop `<script>`, `<style>` and `<noscript>` elements with their content.
fn remove_non_content(html: &str) -> String {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![
                lol_html::element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("style", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("noscript", |el| {
                    el.remove();
                    Ok(())
                }),
            ],
            ..Default::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    String::from_utf8_lossy(&output).into_owned()
}
