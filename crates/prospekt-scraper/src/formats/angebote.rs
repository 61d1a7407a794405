use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use prospekt_core::{PageLocator, ValidityWindow};

use super::{
    collect_flyer_links, date_from_captures, href_contains, og_image, page_image_urls,
    AnchorFilter, FlyerLink, ListingParser, MAX_PAGE_NUMBER,
};
use crate::html::{absolutize_url, anchors};

static DATE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ab-(\d{2})-(\d{2})-(\d{4})-bis-(\d{2})-(\d{2})-(\d{4})").expect("valid regex")
});
static PAGE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/seite-(\d+)/?$").expect("valid regex"));

const IMAGE_ATTRS: [&str; 3] = ["data-src", "data-original", "src"];

const FLYER_TIERS: [AnchorFilter; 3] = [
    |a| href_contains(a, "/woche-"),
    |a| href_contains(a, "prospekt"),
    |a| href_contains(a, "flyer"),
];

/// Aggregator archive; every flyer page is its own `seite-N` viewer document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Angebote;

impl ListingParser for Angebote {
    fn flyer_links(&self, listing_url: &str, html: &str) -> Vec<FlyerLink> {
        collect_flyer_links(listing_url, html, &FLYER_TIERS)
    }

    /// Page 1 is the flyer document itself. Later pages follow the `seite-N`
    /// links; when the viewer only links a window of pages, the missing ones
    /// are addressed by the same URL scheme up to the highest page linked.
    /// Page numbers above [`MAX_PAGE_NUMBER`] are ignored.
    fn page_locators(&self, flyer_url: &str, html: &str) -> Vec<PageLocator> {
        let prefix = strip_page_suffix(flyer_url);

        let mut linked: BTreeMap<usize, String> = BTreeMap::new();
        for anchor in anchors(html) {
            let Some(url) = anchor
                .attr("href")
                .and_then(|href| absolutize_url(flyer_url, &href))
            else {
                continue;
            };
            let path = url.split(['?', '#']).next().unwrap_or(&url);
            if strip_page_suffix(path) != prefix {
                continue;
            }
            let Some(number) = PAGE_SUFFIX_RE
                .captures(path)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok())
            else {
                continue;
            };
            if (1..=MAX_PAGE_NUMBER).contains(&number) {
                linked.entry(number).or_insert(url);
            }
        }

        let last = linked.keys().next_back().copied().unwrap_or(1);
        (1..=last)
            .map(|n| {
                let url = match (n, linked.get(&n)) {
                    (_, Some(url)) => url.clone(),
                    (1, None) => flyer_url.to_string(),
                    (n, None) => format!("{prefix}/seite-{n}"),
                };
                PageLocator::Viewer { url }
            })
            .collect()
    }

    fn viewer_image(&self, viewer_url: &str, html: &str) -> Option<String> {
        let candidates = page_image_urls(viewer_url, html, &IMAGE_ATTRS);
        candidates
            .iter()
            .find(|url| url.to_ascii_lowercase().contains("prospekt"))
            .or_else(|| candidates.first())
            .cloned()
            .or_else(|| og_image(viewer_url, html))
    }

    fn validity(&self, flyer_url: &str) -> Option<ValidityWindow> {
        let caps = DATE_RANGE_RE.captures(flyer_url)?;
        let valid_from = date_from_captures(&caps, 1)?;
        let valid_to = date_from_captures(&caps, 4)?;
        (valid_to >= valid_from).then_some(ValidityWindow {
            valid_from,
            valid_to,
        })
    }
}

/// Flyer URL without query, trailing slash or `seite-N` suffix.
fn strip_page_suffix(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    PAGE_SUFFIX_RE
        .replace(path, "")
        .trim_end_matches('/')
        .to_string()
}
