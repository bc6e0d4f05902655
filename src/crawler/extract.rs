//! Page extractors for the council website
//!
//! Each function turns one page layout into validated domain records:
//! - members page: entities (name, affiliation, profile link) and photos
//! - profile page: yearly document counts per category
//! - detail index: the per-member listing link
//! - listing page: one link per document, grouped by category
//! - document page: status and date of a single document
//!
//! Malformed entries are dropped with a warning; extraction itself never fails.

use crate::model::text::{clean_text, normalize_member_name, parse_count, parse_date_br};
use crate::model::{DetailRecord, Entity, RecordError, SummaryRecord};
use chrono::Datelike;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use url::Url;

/// A member photo referenced from the members page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub name: String,
    pub url: Url,
}

/// A member entry of the detail index page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub listing_url: Url,
}

/// One document link of a member's listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub category: String,
    pub url: Url,
}

/// Why a fetched document produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingStatus,
    MissingDate,
    InvalidDate(String),
    BeforeMinYear(i32),
    Invalid(RecordError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStatus => write!(f, "no status field"),
            Self::MissingDate => write!(f, "no date field"),
            Self::InvalidDate(raw) => write!(f, "unparseable date '{}'", raw),
            Self::BeforeMinYear(year) => write!(f, "dated {} (before minimum year)", year),
            Self::Invalid(e) => write!(f, "invalid record: {}", e),
        }
    }
}

/// Outcome of extracting a single document page
///
/// Both variants are final: the link is marked processed either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailExtraction {
    Record(DetailRecord),
    Skip(SkipReason),
}

fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

fn resolve(base: &Url, href: &str) -> Option<Url> {
    match base.join(href.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("Ignoring unresolvable link '{}': {}", href, e);
            None
        }
    }
}

/// Extracts members from the members page
///
/// Names come from `h2 > a` (political name after `" - "`), affiliations
/// from the `span` elements that hold both a list item and a link. The two
/// lists are zipped positionally; surplus entries on either side are dropped.
pub fn extract_entities(document: &Html, base: &Url) -> Vec<Entity> {
    let root = document.root_element();

    let mut names = Vec::new();
    for heading in select_all(root, "h2") {
        if let Some(anchor) = select_first(heading, "a") {
            let name = normalize_member_name(&anchor.text().collect::<String>());
            let link = anchor
                .value()
                .attr("href")
                .and_then(|href| resolve(base, href))
                .map(String::from);
            names.push((name, link));
        }
    }

    let affiliations: Vec<String> = select_all(root, "span")
        .into_iter()
        .filter(|span| select_first(*span, "li").is_some() && select_first(*span, "a").is_some())
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect();

    if names.len() != affiliations.len() {
        tracing::warn!(
            "Members page lists {} names but {} affiliations",
            names.len(),
            affiliations.len()
        );
    }

    names
        .into_iter()
        .zip(affiliations)
        .filter_map(|((name, link), affiliation)| {
            match Entity::new(&name, &affiliation, link.as_deref()) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!("Dropping member entry '{}': {}", name, e);
                    None
                }
            }
        })
        .collect()
}

/// Extracts member photos (`div.col-md-3 div.img img`) with both `src` and `alt`
pub fn extract_photos(document: &Html, base: &Url) -> Vec<PhotoRef> {
    let mut photos = Vec::new();

    for column in select_all(document.root_element(), "div.col-md-3") {
        let Some(img) = select_first(column, "div.img img") else {
            continue;
        };
        let src = img.value().attr("src").unwrap_or("").trim();
        let alt = img.value().attr("alt").unwrap_or("").trim();
        if src.is_empty() || alt.is_empty() {
            continue;
        }

        let name = normalize_member_name(alt);
        if name.is_empty() {
            continue;
        }
        if let Some(url) = resolve(base, src) {
            photos.push(PhotoRef { name, url });
        }
    }

    photos
}

/// Extracts yearly counts from the "Documentos" table of a profile page
///
/// Year columns are the `th.text-right` headers other than "Total". Each
/// body row is `category, count per year..., total`.
pub fn extract_summaries(document: &Html, entity: &str) -> Vec<SummaryRecord> {
    let root = document.root_element();

    let Some(table) = select_all(root, "table").into_iter().find(|table| {
        select_first(*table, "caption")
            .map(|caption| element_text(caption).contains("Documentos"))
            .unwrap_or(false)
    }) else {
        tracing::warn!(entity = %entity, "Documents table not found");
        return Vec::new();
    };

    let mut years: Vec<String> = select_all(table, "th.text-right")
        .into_iter()
        .map(element_text)
        .filter(|year| !year.is_empty() && year != "Total")
        .collect();
    years.sort();
    years.dedup();

    let mut records = Vec::new();
    for row in select_all(table, "tbody tr") {
        let cells: Vec<String> = select_all(row, "td").into_iter().map(element_text).collect();
        if cells.len() < 2 {
            continue;
        }

        let category = &cells[0];
        if category == "Total" {
            continue;
        }

        let counts = &cells[1..cells.len() - 1];
        for (year, raw) in years.iter().zip(counts) {
            let Some(count) = parse_count(raw) else {
                tracing::warn!(entity = %entity, "Dropping {} {}: count '{}'", category, year, raw);
                continue;
            };
            match SummaryRecord::new(entity, category, year, count) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(entity = %entity, "Dropping summary row: {}", e),
            }
        }
    }

    records
}

/// Extracts the per-member listing links from the detail index page
///
/// When `skip_inactive` is set, members whose name marks them as on leave
/// ("Licenciado"/"Licenciada") are left out.
pub fn extract_index(document: &Html, base: &Url, skip_inactive: bool) -> Vec<IndexEntry> {
    let mut entries = Vec::new();

    for item in select_all(document.root_element(), "div.data-list-item") {
        let Some(heading) = ["h4", "h3", "strong"]
            .iter()
            .find_map(|css| select_first(item, css))
        else {
            continue;
        };

        let name = normalize_member_name(&heading.text().collect::<String>());
        if name.is_empty() {
            continue;
        }
        if skip_inactive && name.contains("Licenciad") {
            tracing::debug!("Skipping inactive member {}", name);
            continue;
        }

        let listing = select_all(item, "a")
            .into_iter()
            .find(|a| a.text().collect::<String>().contains("Detalhadas"))
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve(base, href));

        if let Some(listing_url) = listing {
            entries.push(IndexEntry { name, listing_url });
        }
    }

    entries
}

/// Extracts document links from a member's listing page
///
/// Every `div.data-list-item` block is one category (its `h3`); every
/// paragraph link inside it is one document.
pub fn extract_listing(document: &Html, base: &Url) -> Vec<ListingItem> {
    let mut items = Vec::new();

    for section in select_all(document.root_element(), "div.data-list-item") {
        let Some(heading) = select_first(section, "h3") else {
            continue;
        };
        let category = element_text(heading);
        if category.is_empty() {
            continue;
        }

        for paragraph in select_all(section, "p") {
            let href = select_first(paragraph, "a[href]").and_then(|a| a.value().attr("href"));
            if let Some(url) = href.and_then(|href| resolve(base, href)) {
                items.push(ListingItem {
                    category: category.clone(),
                    url,
                });
            }
        }
    }

    items
}

/// Text of the first non-blank node following `<strong>label</strong>`
fn labeled_value(root: ElementRef<'_>, label: &str) -> Option<String> {
    let strong = select_all(root, "strong")
        .into_iter()
        .find(|strong| element_text(*strong) == label)?;

    strong.next_siblings().find_map(|node| {
        node.value()
            .as_text()
            .map(|text| clean_text(text))
            .filter(|text| !text.is_empty())
    })
}

/// Extracts status and date from a single document page
///
/// Documents dated before `min_year` are skipped, as are documents whose
/// status or date cannot be read.
pub fn extract_detail(
    document: &Html,
    entity: &str,
    category: &str,
    link: &Url,
    min_year: i32,
) -> DetailExtraction {
    let root = document.root_element();

    let Some(status) = labeled_value(root, "Situação:") else {
        return DetailExtraction::Skip(SkipReason::MissingStatus);
    };
    let Some(raw_date) = labeled_value(root, "Data:") else {
        return DetailExtraction::Skip(SkipReason::MissingDate);
    };
    let Some(date) = parse_date_br(&raw_date) else {
        return DetailExtraction::Skip(SkipReason::InvalidDate(raw_date));
    };
    if date.year() < min_year {
        return DetailExtraction::Skip(SkipReason::BeforeMinYear(date.year()));
    }

    match DetailRecord::new(entity, category, &status, date, link.as_str()) {
        Ok(record) => DetailExtraction::Record(record),
        Err(e) => DetailExtraction::Skip(SkipReason::Invalid(e)),
    }
}
