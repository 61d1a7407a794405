use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use prospekt_core::{PageLocator, ValidityWindow};

use super::{
    collect_flyer_links, date_from_captures, href_contains, og_image, page_image_urls,
    AnchorFilter, FlyerLink, ListingParser,
};

/// `…aktionsprospekt-DD-MM-YYYY-DD-MM-YYYY…`
static DATE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})-(\d{2})-(\d{4}).{0,12}?(\d{2})-(\d{2})-(\d{4})").expect("valid regex")
});

const IMAGE_ATTRS: [&str; 4] = ["data-src", "data-original", "data-large", "src"];

const FLYER_TIERS: [AnchorFilter; 3] = [
    |a| {
        a.has_class("flyer")
            && a.attr("data-track-name")
                .is_some_and(|n| n.eq_ignore_ascii_case("Aktionsprospekt"))
    },
    |a| {
        a.has_class("flyer")
            && a.attr("data-track-type")
                .is_some_and(|t| t.eq_ignore_ascii_case("flyer"))
    },
    |a| href_contains(a, "aktionsprospekt"),
];

/// Retailer-hosted flyer overview whose viewer embeds every page image.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lidl;

impl ListingParser for Lidl {
    fn flyer_links(&self, listing_url: &str, html: &str) -> Vec<FlyerLink> {
        collect_flyer_links(listing_url, html, &FLYER_TIERS)
    }

    fn page_locators(&self, flyer_url: &str, html: &str) -> Vec<PageLocator> {
        let mut urls = page_image_urls(flyer_url, html, &IMAGE_ATTRS);
        if urls.is_empty() {
            urls.extend(og_image(flyer_url, html));
        }
        let mut pages: Vec<PageLocator> = Vec::with_capacity(urls.len());
        for url in urls {
            let url = upgrade_resolution(&url);
            if pages.iter().all(|p| p.url() != url) {
                pages.push(PageLocator::Image { url });
            }
        }
        pages
    }

    fn viewer_image(&self, viewer_url: &str, html: &str) -> Option<String> {
        page_image_urls(viewer_url, html, &IMAGE_ATTRS)
            .into_iter()
            .next()
            .or_else(|| og_image(viewer_url, html))
            .map(|url| upgrade_resolution(&url))
    }

    fn validity(&self, flyer_url: &str) -> Option<ValidityWindow> {
        let caps = DATE_RANGE_RE.captures(flyer_url)?;
        let valid_from = date_from_captures(&caps, 1)?;
        let mut valid_to = date_from_captures(&caps, 4)?;
        if valid_to < valid_from {
            return None;
        }
        // Mon-Sat ranges cover the whole week.
        if (valid_to - valid_from).num_days() == 5 {
            valid_to += Duration::days(1);
        }
        Some(ValidityWindow {
            valid_from,
            valid_to,
        })
    }
}

/// Rewrites CDN transformation hints to request the largest rendition.
fn upgrade_resolution(url: &str) -> String {
    let mut url = url.to_string();
    if url.contains("w_") && url.contains("h_") {
        for size in ["400", "600", "800"] {
            url = url
                .replace(&format!("w_{size}"), "w_2000")
                .replace(&format!("h_{size}"), "h_2000");
        }
    }
    if url.contains("q_") {
        url = url.replace("q_auto", "q_100");
    }
    url
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const LISTING: &str = r#"
        <nav><a href="/c/angebote">Angebote</a></nav>
        <a class="flyer" data-track-type="flyer" data-track-name="Aktionsprospekt"
           href="/l/prospekte/aktionsprospekt-06-01-2025-11-01-2025-0a1b/view/flyer/page/1">
           Aktionsprospekt</a>
        <a class="flyer" data-track-type="flyer" data-track-name="Aktionsprospekt"
           href="/l/prospekte/aktionsprospekt-13-01-2025-18-01-2025-2c3d/view/flyer/page/1">
           Aktionsprospekt</a>
        <a class="flyer" data-track-type="flyer" data-track-name="Reiseprospekt"
           href="/l/prospekte/reisen-01-01-2025-31-01-2025/view/flyer/page/1">Reisen</a>
    "#;

    #[test]
    fn aktionsprospekt_tier_is_preferred() {
        let links = Lidl.flyer_links("https://www.lidl.de/c/online-prospekte/s10005610", LISTING);
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].url,
            "https://www.lidl.de/l/prospekte/aktionsprospekt-06-01-2025-11-01-2025-0a1b/view/flyer/page/1"
        );
        assert_eq!(links[0].title, "Aktionsprospekt");
        assert!(links[1].url.contains("13-01-2025"));
    }

    #[test]
    fn falls_back_to_track_type_tier() {
        let html = r#"<a class="flyer" data-track-type="flyer" href="/l/prospekte/x">X</a>"#;
        let links = Lidl.flyer_links("https://www.lidl.de/", html);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "X");
    }

    #[test]
    fn duplicate_links_are_collapsed() {
        let html = r#"
            <a href="/l/prospekte/aktionsprospekt-a">A</a>
            <a href="/l/prospekte/aktionsprospekt-a">A again</a>
        "#;
        let links = Lidl.flyer_links("https://www.lidl.de/", html);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn page_images_use_lazy_attributes_and_upgrade_resolution() {
        let html = r#"
            <img src="/static/logo.png" width="80" height="30">
            <div class="page__wrapper">
              <img src="data:image/gif;base64,R0lGOD" data-src="https://imgproxy.example.com/w_600,h_800,q_auto/p1.jpg">
            </div>
            <div class="page__wrapper">
              <img data-original="//imgproxy.example.com/w_600,h_800,q_auto/p2.jpg">
            </div>
        "#;
        let pages = Lidl.page_locators("https://www.lidl.de/l/prospekte/a", html);
        assert_eq!(
            pages,
            vec![
                PageLocator::Image {
                    url: "https://imgproxy.example.com/w_2000,h_2000,q_100/p1.jpg".to_string()
                },
                PageLocator::Image {
                    url: "https://imgproxy.example.com/w_2000,h_2000,q_100/p2.jpg".to_string()
                },
            ]
        );
    }

    #[test]
    fn og_image_is_used_when_no_img_tags_exist() {
        let html = r#"<meta property="og:image" content="https://cdn.example.com/cover.jpg">"#;
        let pages = Lidl.page_locators("https://www.lidl.de/l/prospekte/a", html);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url(), "https://cdn.example.com/cover.jpg");
    }

    #[test]
    fn six_day_range_is_extended_to_sunday() {
        let window = Lidl
            .validity("https://www.lidl.de/l/prospekte/aktionsprospekt-06-01-2025-11-01-2025-0a1b")
            .expect("window");
        assert_eq!(window.valid_from, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(window.valid_to, NaiveDate::from_ymd_opt(2025, 1, 12).unwrap());
    }

    #[test]
    fn other_ranges_are_kept() {
        let window = Lidl
            .validity("https://www.lidl.de/l/prospekte/reisen-01-01-2025-31-01-2025")
            .expect("window");
        assert_eq!(window.valid_to, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert!(Lidl.validity("https://www.lidl.de/l/prospekte/a").is_none());
    }
}
