//! Structural strategy: table rows and labelled container divs.
//!
//! Every `<tr>` with at least two cells becomes a record by position: cell
//! `n` fills the content type's `n`th positional field. Header rows made
//! only of `<th>` cells are skipped. Column order is assumed, not detected,
//! so a site with a different layout gets mislabelled fields.
//!
//! Divs whose `class` or `id` mentions a container keyword are searched for
//! `label: value` pairs; when such divs nest, only the innermost are used.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::content::{CONTAINER_KEYWORDS, ContentType};
use crate::error::StrategyError;
use crate::fields::Record;
use crate::strategy::ExtractionContext;

pub fn extract(html: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<Record>, StrategyError> {
    let document = Html::parse_document(html);

    let mut records = table_rows(&document, ctx.content_type)?;

    let matcher = LabelMatcher::new(ctx.content_type)?;
    for block in keyword_blocks(&document, "div", &CONTAINER_KEYWORDS)? {
        let record = matcher.extract(&block.inner_html());
        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(records)
}

fn table_rows(document: &Html, content_type: ContentType) -> Result<Vec<Record>, StrategyError> {
    let rows = selector("tr")?;
    let fields = content_type.positional_fields();
    let mut records = Vec::new();

    for row in document.select(&rows) {
        let cells = row_cells(row);
        if cells.len() < 2 || is_header_row(&cells) {
            continue;
        }

        let record: Record = fields.iter().zip(&cells).map(|(field, cell)| (*field, cell.inner_html())).collect();
        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(records)
}

pub(crate) fn selector(css: &str) -> Result<Selector, StrategyError> {
    Selector::parse(css).map_err(|e| StrategyError::Selector(e.to_string()))
}

/// The `<td>`/`<th>` children of a row; cells of nested tables are not included.
pub(crate) fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

pub(crate) fn is_header_row(cells: &[ElementRef<'_>]) -> bool {
    !cells.is_empty() && cells.iter().all(|cell| cell.value().name() == "th")
}

fn is_keyword_tagged(element: &ElementRef<'_>, keywords: &[&str]) -> bool {
    ["class", "id"]
        .iter()
        .filter_map(|name| element.value().attr(name))
        .any(|value| {
            let value = value.to_lowercase();
            keywords.iter().any(|keyword| value.contains(keyword))
        })
}

/// Elements matching `css` whose class or id mentions a keyword, keeping
/// only those with no tagged descendant.
pub(crate) fn keyword_blocks<'a>(
    document: &'a Html, css: &str, keywords: &[&str],
) -> Result<Vec<ElementRef<'a>>, StrategyError> {
    let sel = selector(css)?;
    let tagged: Vec<ElementRef<'a>> = document.select(&sel).filter(|el| is_keyword_tagged(el, keywords)).collect();

    Ok(tagged
        .iter()
        .filter(|el| {
            !tagged
                .iter()
                .any(|other| other.id() != el.id() && other.ancestors().any(|ancestor| ancestor.id() == el.id()))
        })
        .copied()
        .collect())
}

/// Finds `label: value` pairs for each field of a content type.
///
/// Three label shapes are tried per field, in order:
/// an element whose attributes name the field (`<span class="amount">$5</span>`),
/// a wrapped label followed by its value (`<strong>Deadline:</strong> May 1`),
/// and plain `field: value` text.
pub(crate) struct LabelMatcher {
    patterns: Vec<(&'static str, [Regex; 3])>,
}

impl LabelMatcher {
    pub(crate) fn new(content_type: ContentType) -> Result<Self, StrategyError> {
        let patterns = content_type
            .fields()
            .into_iter()
            .map(|field| -> Result<(&'static str, [Regex; 3]), StrategyError> {
                let label = regex::escape(field).replace('_', r"[\s_-]?");
                Ok((
                    field,
                    [
                        Regex::new(&format!(r"(?is)<[a-z][a-z0-9]*\s[^>]*\b{label}\b[^>]*>\s*([^<]+)"))?,
                        Regex::new(&format!(
                            r"(?is)<(?:strong|b|em|label|dt|th|span|h[1-6])\b[^>]*>\s*{label}\s*:?\s*</(?:strong|b|em|label|dt|th|span|h[1-6])>\s*(?:<[^>]+>\s*)*([^<]+)"
                        ))?,
                        Regex::new(&format!(r"(?i)\b{label}\s*:\s*([^<\n]+)"))?,
                    ],
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub(crate) fn extract(&self, fragment: &str) -> Record {
        let mut record = Record::new();

        for (field, patterns) in &self.patterns {
            for pattern in patterns {
                let value = pattern.captures(fragment).and_then(|caps| caps.get(1));
                if let Some(value) = value
                    && record.set(field, value.as_str())
                {
                    break;
                }
            }
        }

        record
    }
}
