//! Site-specific rules, chosen by the resolved profile.
//!
//! * [`SiteRule::GrantsGovTable`]: search-result rows laid out as
//!   number, title, agency, status, posted date, close date.
//! * [`SiteRule::EmbeddedJson`]: application state shipped as JSON in
//!   `<script type="application/json">`, `__NEXT_DATA__` or a
//!   `window.__STATE__ = {...}` assignment.
//!
//! When the rule finds nothing, or the site has no rule, a generic pass for
//! government pages runs: tables with a recognisable header row first, then
//! keyword-tagged `<tr>`/`<div>` blocks.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;
use tracing::debug;

use crate::content::{CONTAINER_KEYWORDS, ContentType, FieldRole};
use crate::error::StrategyError;
use crate::fields::{CURRENCY, DATE, Record, clean_value, first_sentence};
use crate::profile::SiteRule;
use crate::strategy::structural::{LabelMatcher, is_header_row, keyword_blocks, row_cells, selector};
use crate::strategy::{ExtractionContext, field_for_label};

static WINDOW_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\.__[A-Za-z0-9_]+__\s*=\s*").expect("window state pattern"));

const MAX_TITLE_CHARS: usize = 200;

pub fn extract(html: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<Record>, StrategyError> {
    let content_type = ctx.content_type;
    let document = Html::parse_document(html);

    let mut deferred = None;
    let records = match ctx.profile.rule {
        SiteRule::GrantsGovTable => grants_gov_table(&document, content_type)?,
        SiteRule::EmbeddedJson => embedded_json(&document, content_type).unwrap_or_else(|e| {
            deferred = Some(e);
            Vec::new()
        }),
        SiteRule::Generic => Vec::new(),
    };

    if !records.is_empty() {
        return Ok(records);
    }

    debug!(rule = %ctx.profile.rule, domain = %ctx.profile.domain_pattern, "falling back to generic government rules");
    let generic = generic_government(&document, content_type)?;

    match deferred {
        Some(e) if generic.is_empty() => Err(e),
        _ => Ok(generic),
    }
}

fn grants_gov_table(document: &Html, content_type: ContentType) -> Result<Vec<Record>, StrategyError> {
    let rows = selector("tr")?;
    let mut records = Vec::new();

    for row in document.select(&rows) {
        let cells: Vec<ElementRef<'_>> = row_cells(row).into_iter().filter(|c| c.value().name() == "td").collect();
        if cells.len() < 6 {
            continue;
        }

        let mut record = Record::new();
        record.set(content_type.field(FieldRole::Title), &cells[1].inner_html());
        record.set(content_type.field(FieldRole::Agency), &cells[2].inner_html());
        record.set(content_type.field(FieldRole::Deadline), &cells[5].inner_html());
        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(records)
}

fn embedded_json(document: &Html, content_type: ContentType) -> Result<Vec<Record>, StrategyError> {
    let mut records = Vec::new();
    let mut first_error = None;

    for source in json_sources(document)? {
        match serde_json::from_str::<Value>(&source) {
            Ok(value) => collect_json_records(&value, content_type, &mut records),
            Err(e) => {
                debug!(error = %e, "malformed embedded JSON");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if records.is_empty() => Err(e.into()),
        _ => Ok(records),
    }
}

/// JSON payloads embedded in the page's scripts.
fn json_sources(document: &Html) -> Result<Vec<String>, StrategyError> {
    let scripts = selector("script")?;
    let mut sources = Vec::new();

    for script in document.select(&scripts) {
        let body: String = script.text().collect();
        let declared_json = script.value().attr("type").is_some_and(|t| t.to_ascii_lowercase().contains("json"))
            || script.value().attr("id") == Some("__NEXT_DATA__");

        if declared_json {
            if !body.trim().is_empty() {
                sources.push(body.trim().to_string());
            }
            continue;
        }

        for assignment in WINDOW_STATE.find_iter(&body) {
            if let Some(object) = object_literal(&body[assignment.end()..]) {
                sources.push(object.to_string());
            }
        }
    }

    Ok(sources)
}

/// The `{...}` object at the start of `text`, matched by brace depth.
/// An unbalanced object yields the rest of the text so parsing reports it.
fn object_literal(text: &str) -> Option<&str> {
    let text = text.trim_start();
    if !text.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ => {}
        }
    }

    Some(text)
}

/// Walk a JSON value; every object with a title-like string key becomes a
/// record and is not descended into further.
fn collect_json_records(value: &Value, content_type: ContentType, records: &mut Vec<Record>) {
    match value {
        Value::Object(map) => {
            let title_field = content_type.field(FieldRole::Title);
            let has_title = map
                .iter()
                .any(|(key, value)| value.is_string() && field_for_label(key, content_type) == Some(title_field));

            if has_title {
                let mut record = Record::new();
                for (key, value) in map {
                    if let Some(field) = field_for_label(key, content_type)
                        && let Some(text) = scalar_text(value)
                    {
                        record.set_if_absent(field, &text);
                    }
                }
                if !record.is_empty() {
                    records.push(record);
                    return;
                }
            }

            for child in map.values() {
                collect_json_records(child, content_type, records);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_json_records(item, content_type, records);
            }
        }
        _ => {}
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn generic_government(document: &Html, content_type: ContentType) -> Result<Vec<Record>, StrategyError> {
    let records = header_mapped_tables(document, content_type)?;
    if !records.is_empty() {
        return Ok(records);
    }

    let mut keywords: Vec<&str> = CONTAINER_KEYWORDS.to_vec();
    keywords.extend(content_type.keywords().iter().copied().filter(|k| !CONTAINER_KEYWORDS.contains(k)));

    let matcher = LabelMatcher::new(content_type)?;
    let mut records = Vec::new();

    for block in keyword_blocks(document, "tr, div", &keywords)? {
        let inner = block.inner_html();
        let mut record = matcher.extract(&inner);

        if let Some(text) = clean_value(&inner) {
            if let Some(sentence) = first_sentence(&text) {
                let title: String = sentence.chars().take(MAX_TITLE_CHARS).collect();
                record.set_if_absent(content_type.field(FieldRole::Title), &title);
            }
            if let Some(amount) = CURRENCY.find(&text) {
                record.set_if_absent(content_type.field(FieldRole::Amount), amount.as_str());
            }
            if let Some(date) = DATE.find(&text) {
                record.set_if_absent(content_type.field(FieldRole::Deadline), date.as_str());
            }
        }

        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(records)
}

/// Rows of tables whose `<th>` header row names the columns.
fn header_mapped_tables(document: &Html, content_type: ContentType) -> Result<Vec<Record>, StrategyError> {
    let tables = selector("table")?;
    let row_selector = selector("tr")?;
    let mut records = Vec::new();

    for table in document.select(&tables) {
        let rows: Vec<ElementRef<'_>> = table
            .select(&row_selector)
            .filter(|row| {
                row.ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|ancestor| ancestor.value().name() == "table")
                    .is_some_and(|owner| owner.id() == table.id())
            })
            .collect();

        let Some(header_index) = rows.iter().position(|row| is_header_row(&row_cells(*row))) else {
            continue;
        };

        let columns: Vec<Option<&'static str>> = row_cells(rows[header_index])
            .iter()
            .map(|cell| clean_value(&cell.inner_html()).and_then(|label| field_for_label(&label, content_type)))
            .collect();
        if columns.iter().all(Option::is_none) {
            continue;
        }

        for row in &rows[header_index + 1..] {
            let cells = row_cells(*row);
            if is_header_row(&cells) {
                continue;
            }

            let mut record = Record::new();
            for (field, cell) in columns.iter().zip(&cells) {
                if let Some(field) = field {
                    record.set_if_absent(field, &cell.inner_html());
                }
            }
            if !record.is_empty() {
                records.push(record);
            }
        }
    }

    Ok(records)
}
