//! Flyer acquisition types shared by the locator, fetcher and orchestrator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::retailers::ListingFormat;

/// Date range a flyer's offers are valid for, as advertised by the retailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

/// One entry of a retailer's currently published flyer list.
///
/// `ordinal` is 1-based and follows the order the listing presents flyers in.
/// That order is stable within one listing fetch only; the upstream may
/// reorder between fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlyerListing {
    pub ordinal: usize,
    pub title: String,
    pub url: String,
    pub validity: Option<ValidityWindow>,
}

/// Where a single flyer page can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageLocator {
    /// Direct link to the page image.
    Image { url: String },
    /// HTML viewer document whose main image is the page.
    Viewer { url: String },
}

impl PageLocator {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            PageLocator::Image { url } | PageLocator::Viewer { url } => url,
        }
    }
}

/// A resolved flyer: which retailer, which ordinal, and every page to fetch.
///
/// Page numbers are 1-based positions in `page_locators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlyerReference {
    pub retailer_key: String,
    /// Site structure viewer pages are parsed with.
    pub format: ListingFormat,
    pub ordinal: usize,
    pub title: String,
    pub source_url: String,
    pub validity: Option<ValidityWindow>,
    pub page_locators: Vec<PageLocator>,
}

impl FlyerReference {
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_locators.len()
    }

    /// Iterate `(page_number, locator)` pairs in page order.
    pub fn pages(&self) -> impl Iterator<Item = (usize, &PageLocator)> {
        self.page_locators
            .iter()
            .enumerate()
            .map(|(idx, locator)| (idx + 1, locator))
    }
}

/// Raw bytes of one downloaded flyer page.
///
/// Ownership moves from the fetcher to the preprocessor; nothing else keeps
/// a reference to the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct FlyerPage {
    pub page_number: usize,
    pub source_url: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for FlyerPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlyerPage")
            .field("page_number", &self.page_number)
            .field("source_url", &self.source_url)
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_numbered_from_one() {
        let reference = FlyerReference {
            retailer_key: "lidl".to_string(),
            format: ListingFormat::Lidl,
            ordinal: 1,
            title: "Aktionsprospekt".to_string(),
            source_url: "https://www.lidl.de/l/prospekte/a".to_string(),
            validity: None,
            page_locators: vec![
                PageLocator::Image {
                    url: "https://cdn.example.com/1.jpg".to_string(),
                },
                PageLocator::Viewer {
                    url: "https://angebote.com/seite-2".to_string(),
                },
            ],
        };
        let pages: Vec<(usize, &str)> = reference.pages().map(|(n, l)| (n, l.url())).collect();
        assert_eq!(
            pages,
            vec![
                (1, "https://cdn.example.com/1.jpg"),
                (2, "https://angebote.com/seite-2")
            ]
        );
        assert_eq!(reference.page_count(), 2);
    }

    #[test]
    fn page_locator_serializes_with_kind_tag() {
        let json = serde_json::to_value(PageLocator::Viewer {
            url: "https://angebote.com/x".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "viewer");
        assert_eq!(json["url"], "https://angebote.com/x");
    }
}
