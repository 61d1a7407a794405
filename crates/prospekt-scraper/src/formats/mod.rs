//! Site-structure parsers, one per [`ListingFormat`].
//!
//! Parsers are pure: they turn already-fetched HTML into links and page
//! locators and never perform I/O themselves.

mod angebote;
mod lidl;

use chrono::NaiveDate;
use prospekt_core::{ListingFormat, PageLocator, ValidityWindow};

use crate::html::{absolutize_url, anchors, extract_attr, find_meta_content, img_tags, Anchor};

pub use angebote::Angebote;
pub use lidl::Lidl;

/// Images declaring a smaller width or height are icons, logos or thumbnails.
const MIN_PAGE_IMAGE_EDGE: u32 = 200;

/// Highest page number a parser accepts from upstream markup. Larger numbers
/// are ignored rather than expanded into page locators.
const MAX_PAGE_NUMBER: usize = 500;

/// A flyer as linked from a retailer listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlyerLink {
    pub url: String,
    pub title: String,
}

pub trait ListingParser: Send + Sync {
    /// Flyer links in listing order, deduplicated by URL.
    fn flyer_links(&self, listing_url: &str, html: &str) -> Vec<FlyerLink>;

    /// Page locators of one flyer document, in page order.
    fn page_locators(&self, flyer_url: &str, html: &str) -> Vec<PageLocator>;

    /// Main page image of a viewer document.
    fn viewer_image(&self, viewer_url: &str, html: &str) -> Option<String>;

    /// Advertised validity window, read from the flyer URL.
    fn validity(&self, flyer_url: &str) -> Option<ValidityWindow>;
}

#[must_use]
pub fn parser_for(format: ListingFormat) -> &'static dyn ListingParser {
    match format {
        ListingFormat::Lidl => &Lidl,
        ListingFormat::Angebote => &Angebote,
    }
}

type AnchorFilter = fn(&Anchor<'_>) -> bool;

/// Applies `tiers` in order; the first tier matching any link wins.
fn collect_flyer_links(listing_url: &str, html: &str, tiers: &[AnchorFilter]) -> Vec<FlyerLink> {
    for tier in tiers {
        let mut links: Vec<FlyerLink> = Vec::new();
        for anchor in anchors(html).filter(|a| tier(a)) {
            let Some(url) = anchor
                .attr("href")
                .and_then(|href| absolutize_url(listing_url, &href))
            else {
                continue;
            };
            if links.iter().any(|l| l.url == url) {
                continue;
            }
            let title = anchor
                .attr("data-track-name")
                .or_else(|| anchor.attr("title"))
                .filter(|t| !t.is_empty())
                .or_else(|| Some(anchor.text.clone()).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| "Prospekt".to_string());
            links.push(FlyerLink { url, title });
        }
        if !links.is_empty() {
            return links;
        }
    }
    Vec::new()
}

fn href_contains(anchor: &Anchor<'_>, needle: &str) -> bool {
    anchor
        .attr("href")
        .is_some_and(|href| href.to_ascii_lowercase().contains(needle))
}

/// Candidate page images in document order, deduplicated.
///
/// `attrs` lists the attributes to read the URL from, most preferred first;
/// lazy-loading attributes precede `src`.
fn page_image_urls(base_url: &str, html: &str, attrs: &[&str]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for tag in img_tags(html) {
        if declares_small_size(tag) {
            continue;
        }
        let Some(url) = attrs
            .iter()
            .filter_map(|attr| extract_attr(tag, attr))
            .find_map(|raw| absolutize_url(base_url, &raw))
        else {
            continue;
        };
        if is_vector_image(&url) || urls.contains(&url) {
            continue;
        }
        urls.push(url);
    }
    urls
}

fn declares_small_size(tag: &str) -> bool {
    let dimension = |attr: &str| {
        extract_attr(tag, attr)
            .and_then(|v| v.trim_end_matches("px").trim().parse::<u32>().ok())
    };
    match (dimension("width"), dimension("height")) {
        (Some(w), Some(h)) => w < MIN_PAGE_IMAGE_EDGE || h < MIN_PAGE_IMAGE_EDGE,
        _ => false,
    }
}

fn is_vector_image(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".svg")
}

fn og_image(base_url: &str, html: &str) -> Option<String> {
    find_meta_content(html, "property", "og:image").and_then(|raw| absolutize_url(base_url, &raw))
}

fn date_from_captures(caps: &regex::Captures<'_>, day: usize) -> Option<NaiveDate> {
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = caps.get(day + 2)?.as_str().parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, part(day + 1)?, part(day)?)
}
