//! Regex-based HTML helpers shared by the listing formats.

use std::sync::LazyLock;

use regex::Regex;

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("valid regex"));
static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid regex"));
static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)(?:^|\s)([^\s"'<>/=]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// An `<a>` element: its opening-tag attributes and visible text.
#[derive(Debug, Clone)]
pub(crate) struct Anchor<'a> {
    pub attrs: &'a str,
    pub text: String,
}

impl Anchor<'_> {
    pub fn attr(&self, name: &str) -> Option<String> {
        extract_attr(self.attrs, name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

pub(crate) fn anchors(html: &str) -> impl Iterator<Item = Anchor<'_>> {
    ANCHOR_RE.captures_iter(html).filter_map(|caps| {
        let attrs = caps.get(1)?.as_str();
        let inner = caps.get(2).map_or("", |m| m.as_str());
        let text = WHITESPACE_RE
            .replace_all(&TAG_RE.replace_all(inner, " "), " ")
            .trim()
            .to_string();
        Some(Anchor { attrs, text })
    })
}

pub(crate) fn img_tags(html: &str) -> impl Iterator<Item = &str> {
    IMG_TAG_RE.find_iter(html).map(|m| m.as_str())
}

/// Reads a quoted attribute value from a single tag.
///
/// Attributes are scanned left to right as whole `name="value"` pairs, so
/// `src` never matches `data-src` and text inside another value is skipped.
pub(crate) fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    ATTR_RE.captures_iter(tag).find_map(|caps| {
        if !caps.get(1)?.as_str().eq_ignore_ascii_case(attr) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// Content of the first `<meta>` tag whose `key` attribute equals `value`.
pub(crate) fn find_meta_content(html: &str, key: &str, value: &str) -> Option<String> {
    META_TAG_RE.find_iter(html).find_map(|m| {
        let tag = m.as_str();
        let matches = extract_attr(tag, key).is_some_and(|v| v.eq_ignore_ascii_case(value));
        if matches {
            extract_attr(tag, "content").filter(|c| !c.is_empty())
        } else {
            None
        }
    })
}

/// Resolves `candidate` (absolute, protocol-relative, root-relative or relative)
/// against `base_url`.
pub(crate) fn absolutize_url(base_url: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim().replace("&amp;", "&");
    if candidate.is_empty() || candidate.starts_with("data:") || candidate.starts_with('#') {
        return None;
    }
    let base = reqwest::Url::parse(base_url).ok()?;
    let joined = base.join(&candidate).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_attr_does_not_confuse_src_with_data_src() {
        let tag = r#"<img data-src="https://cdn.example.com/big.jpg" src="data:image/gif;base64,R0lG">"#;
        assert_eq!(
            extract_attr(tag, "data-src").as_deref(),
            Some("https://cdn.example.com/big.jpg")
        );
        assert_eq!(
            extract_attr(tag, "src").as_deref(),
            Some("data:image/gif;base64,R0lG")
        );
    }

    #[test]
    fn extract_attr_accepts_single_quotes() {
        let tag = "<a href='/l/prospekte/a' class='flyer'>";
        assert_eq!(extract_attr(tag, "href").as_deref(), Some("/l/prospekte/a"));
        assert_eq!(extract_attr(tag, "title"), None);
    }

    #[test]
    fn extract_attr_skips_lookalikes_inside_other_values() {
        let tag = r#"<img alt="see src='/fake.jpg' here" SRC="/real.jpg">"#;
        assert_eq!(extract_attr(tag, "src").as_deref(), Some("/real.jpg"));
        assert_eq!(
            extract_attr(tag, "alt").as_deref(),
            Some("see src='/fake.jpg' here")
        );
    }

    #[test]
    fn anchors_capture_text_without_markup() {
        let html = r#"<a class="flyer" href="/x"><span>Aktions</span>
            prospekt</a>"#;
        let anchor = anchors(html).next().expect("anchor");
        assert!(anchor.has_class("flyer"));
        assert!(!anchor.has_class("fly"));
        assert_eq!(anchor.text, "Aktions prospekt");
    }

    #[test]
    fn absolutize_resolves_relative_forms() {
        let base = "https://www.lidl.de/c/online-prospekte/s10005610";
        assert_eq!(
            absolutize_url(base, "//cdn.lidl.de/p/1.jpg").as_deref(),
            Some("https://cdn.lidl.de/p/1.jpg")
        );
        assert_eq!(
            absolutize_url(base, "/l/prospekte/a/?x=1&amp;y=2").as_deref(),
            Some("https://www.lidl.de/l/prospekte/a/?x=1&y=2")
        );
        assert_eq!(
            absolutize_url(base, "seite-2").as_deref(),
            Some("https://www.lidl.de/c/online-prospekte/seite-2")
        );
        assert_eq!(absolutize_url(base, "data:image/png;base64,AA"), None);
        assert_eq!(absolutize_url(base, "javascript:void(0)"), None);
    }

    #[test]
    fn finds_og_image_meta() {
        let html = r#"<meta property="og:image" content="https://cdn.example.com/p1.jpg">"#;
        assert_eq!(
            find_meta_content(html, "property", "og:image").as_deref(),
            Some("https://cdn.example.com/p1.jpg")
        );
    }
}
