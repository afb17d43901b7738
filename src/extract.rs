use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::crawl::GroupLabel;
use crate::normalize::{normalize_gender, normalize_status};
use crate::record::CharacterRecord;

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.mw-page-title-main").unwrap());
static INFOBOX_ITEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".pi-item[data-source]").unwrap());
static DATA_VALUE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".pi-data-value").unwrap());
static COLLAPSIBLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".mw-collapsible-content").unwrap());
static TABLE_CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static IMAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("figure.pi-item img").unwrap());
const HIDDEN_CLASSES: [&str; 2] = ["mw-collapsible-content", "mw-collapsible-toggle"];
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Build a candidate record from a character detail page.
///
/// Gender and status are normalized here; nothing downstream re-normalizes.
pub fn extract_character(
    html: &str,
    page_url: &str,
    group: &GroupLabel,
    scraped_at: DateTime<Utc>,
) -> CharacterRecord {
    let doc = Html::parse_document(html);

    let name = doc
        .select(&TITLE_SEL)
        .next()
        .map(joined_text)
        .filter(|t| !t.is_empty());

    let gender_raw = infobox_field(&doc, "gender", "Gender");
    let status_raw = infobox_field(&doc, "status", "Status");

    let image_url = doc
        .select(&IMAGE_SEL)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let record = CharacterRecord {
        name,
        source_collection: Some(group.collection.clone()),
        fandom: Some(group.fandom.clone()),
        source_url: page_url.to_string(),
        gender: normalize_gender(&gender_raw),
        status: normalize_status(&status_raw),
        image_url,
        scraped_at: Some(scraped_at),
    };

    debug!(
        name = ?record.name,
        gender = %gender_raw,
        status = %status_raw,
        url = %record.source_url,
        "Character parsed"
    );
    record
}

/// Fallback chain for an info-box field: data value, then collapsed content,
/// then the legacy two-column table. Returns "" when every step misses.
fn infobox_field(doc: &Html, source: &str, label: &str) -> String {
    let chain: [fn(&Html, &str, &str) -> String; 3] = [
        |doc, source, _| infobox_data_value(doc, source),
        |doc, source, _| infobox_collapsed_value(doc, source),
        |doc, _, label| legacy_table_value(doc, label),
    ];
    chain
        .iter()
        .map(|step| step(doc, source, label))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

fn infobox_items<'a>(doc: &'a Html, source: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    doc.select(&INFOBOX_ITEM_SEL).filter(move |el| {
        el.value()
            .attr("data-source")
            .is_some_and(|ds| ds.trim().eq_ignore_ascii_case(source))
    })
}

fn infobox_data_value(doc: &Html, source: &str) -> String {
    infobox_items(doc, source)
        .flat_map(|item| item.select(&DATA_VALUE_SEL))
        .map(visible_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn infobox_collapsed_value(doc: &Html, source: &str) -> String {
    infobox_items(doc, source)
        .flat_map(|item| item.select(&DATA_VALUE_SEL))
        .flat_map(|value| value.select(&COLLAPSIBLE_SEL))
        .map(joined_text)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// Older wikis lay characters out as `<td><b>Gender</b></td><td>value</td>`.
fn legacy_table_value(doc: &Html, label: &str) -> String {
    doc.select(&TABLE_CELL_SEL)
        .filter(|td| {
            td.children()
                .filter_map(ElementRef::wrap)
                .any(|child| child.value().name() == "b" && joined_text(child).contains(label))
        })
        .find_map(|td| {
            td.next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sib| sib.value().name() == "td")
                .map(joined_text)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

/// Text nodes joined by single spaces, inner whitespace runs collapsed.
fn joined_text(el: ElementRef<'_>) -> String {
    collapse_ws(el.text())
}

fn collapse_ws<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined = parts
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    WS_RE.replace_all(&joined, " ").into_owned()
}

/// Like `joined_text`, but skips the hidden part of a collapsible block
/// (its toggle label and folded content). Text directly in the wrapper stays.
fn visible_text(el: ElementRef<'_>) -> String {
    let parts = el
        .descendants()
        .filter_map(|node| node.value().as_text().map(|t| (node, t)))
        .filter(|(node, _)| {
            !node.ancestors().take_while(|a| a.id() != el.id()).any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| e.classes().any(|c| HIDDEN_CLASSES.contains(&c)))
            })
        })
        .map(|(_, t)| &**t);
    collapse_ws(parts)
}
