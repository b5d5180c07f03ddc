//! HTML parser for extracting links and resource references
//!
//! Extraction always runs on the original fetched markup, never on the
//! noise-stripped copy used for markdown, so navigation links still feed the
//! frontier.

use scraper::{Html, Selector};
use url::Url;

/// An outbound anchor found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// Absolute URL of the link target
    pub url: String,

    /// Collapsed anchor text (may be empty)
    pub text: String,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// All `<a href>` targets, in document order
    pub links: Vec<PageLink>,

    /// All `<img src>` targets, in document order
    pub images: Vec<String>,
}

/// Parses HTML content and extracts links, image references and the title
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document (navigation included)
/// - `<img src="...">` for resource downloads
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
/// - Anything that is not http(s) after resolution
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The URL the markup was served from (after redirects)
///
/// # Example
///
/// ```
/// use corpus_crawler::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url, "https://example.com/page");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
        images: extract_images(&document, base_url),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<PageLink> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let url = resolve_link(element.value().attr("href")?, base_url)?;
            let text = element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            Some(PageLink { url, text })
        })
        .collect()
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| resolve_link(element.value().attr("src")?, base_url))
        .collect()
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}

/// Returns true if the URL path ends with `.pdf` (case-insensitive)
pub fn is_pdf_link(url: &str) -> bool {
    path_extension(url).is_some_and(|ext| ext == ".pdf")
}

/// Lower-cased extension of the URL path, including the leading dot
///
/// Query strings and fragments are ignored; `None` when the last path
/// segment has no extension.
pub fn path_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;
    let dot = segment.rfind('.')?;
    let ext = &segment[dot..];

    (ext.len() > 1).then(|| ext.to_ascii_lowercase())
}
