//! HTML to markdown conversion for saved pages
//!
//! Pages are stored as markdown with a one-line provenance header. Layout
//! chrome (navigation, headers, footers, sidebars, forms) and executable
//! content are dropped before conversion. Link extraction does not go through
//! this module; it always reads the original markup.

use crate::CrawlError;
use htmd::HtmlToMarkdown;
use scraper::{ElementRef, Html};

/// Elements removed before conversion
pub const NOISE_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe",
];

/// Converts an HTML document to markdown with noise elements stripped
///
/// Tables are rendered as pipe tables, the first row becoming the header.
///
/// # Arguments
///
/// * `source_url` - URL the markup came from (used in error reports)
/// * `html` - The raw HTML document
///
/// # Returns
///
/// * `Ok(String)` - Trimmed markdown body
/// * `Err(CrawlError::Content)` - The converter rejected the document
pub fn html_to_markdown(source_url: &str, html: &str) -> Result<String, CrawlError> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(NOISE_TAGS.to_vec())
        .build();

    let document = Html::parse_document(html);
    let mut markup = document.root_element().html();
    let mut tables = Vec::new();

    for table in document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "table" && enclosing_table(*el).is_none())
    {
        let token = format!("CRAWLTABLE{}END", tables.len());
        let outer = table.html();
        if markup.contains(&outer) {
            markup = markup.replacen(&outer, &format!("<p>{}</p>", token), 1);
            tables.push((token, table_to_markdown(table)));
        }
    }

    let mut markdown = converter
        .convert(&markup)
        .map_err(|e| CrawlError::Content {
            url: source_url.to_string(),
            message: e.to_string(),
        })?;

    for (token, table) in &tables {
        markdown = markdown.replace(token, table);
    }
    Ok(markdown.trim().to_string())
}

/// Nearest `table` element above `element`
fn enclosing_table(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
}

/// Renders the rows of one table, nested tables excluded
fn table_to_markdown(table: ElementRef<'_>) -> String {
    let rows: Vec<Vec<String>> = table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
        .filter(|row| enclosing_table(*row).map(|t| t.id()) == Some(table.id()))
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(cell_text)
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Prepends the provenance header to a page body
///
/// The first line of every saved page is `--- SOURCE: <url> ---`.
pub fn render_page(source_url: &str, body: &str) -> String {
    format!("--- SOURCE: {} ---\n\n{}\n", source_url, body.trim_end())
}

/// Converts and renders an HTML page in one step
pub fn page_document(source_url: &str, html: &str) -> Result<String, CrawlError> {
    let markdown = html_to_markdown(source_url, html)?;
    Ok(render_page(source_url, &markdown))
}

/// Visible text of a document, whitespace-collapsed
///
/// Fallback body for pages the converter rejects.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words = Vec::new();
    collect_text(document.root_element(), &mut words);
    words.join(" ")
}

/// Gathers words under `element`, skipping noise subtrees
fn collect_text<'a>(element: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            if !NOISE_TAGS.contains(&el.value().name()) {
                collect_text(el, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.extend(text.split_whitespace());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html>
        <head><title>Scheme Details</title><style>body { color: red; }</style></head>
        <body>
            <header>Site Banner</header>
            <nav><a href="/home">Home Menu</a></nav>
            <main>
                <h1>Pension Scheme</h1>
                <p>Eligible citizens receive <strong>monthly</strong> support.</p>
            </main>
            <aside>Related Sidebar</aside>
            <form><input name="q">Search Box</form>
            <script>trackVisitor();</script>
            <footer>Copyright Footer</footer>
        </body>
    </html>"#;

    #[test]
    fn test_noise_is_stripped() {
        let markdown = html_to_markdown("https://example.com/", PAGE).unwrap();

        assert!(markdown.contains("Pension Scheme"));
        assert!(markdown.contains("monthly"));
        for noise in [
            "Site Banner",
            "Home Menu",
            "Related Sidebar",
            "Search Box",
            "trackVisitor",
            "Copyright Footer",
            "color: red",
        ] {
            assert!(!markdown.contains(noise), "found {:?} in {:?}", noise, markdown);
        }
    }

    #[test]
    fn test_headings_become_markdown() {
        let markdown = html_to_markdown("https://example.com/", "<h1>Title</h1><p>Body</p>").unwrap();
        assert!(markdown.starts_with("# Title"));
        assert!(markdown.contains("Body"));
    }

    #[test]
    fn test_render_page_header() {
        let page = render_page("https://example.com/a", "# Title\n\nBody\n\n");
        assert_eq!(page, "--- SOURCE: https://example.com/a ---\n\n# Title\n\nBody\n");
        assert_eq!(page.lines().next(), Some("--- SOURCE: https://example.com/a ---"));
    }

    #[test]
    fn test_page_document() {
        let page = page_document("https://example.com/", PAGE).unwrap();
        assert!(page.starts_with("--- SOURCE: https://example.com/ ---\n\n"));
        assert!(page.contains("Pension Scheme"));
    }

    #[test]
    fn test_visible_text() {
        assert_eq!(
            visible_text("<p>Hello\n   <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn test_visible_text_skips_noise() {
        let text = visible_text(PAGE);
        assert!(text.contains("Pension Scheme"));
        assert!(text.contains("Eligible citizens receive monthly support."));
        for noise in ["Scheme Details", "Home Menu", "trackVisitor", "Copyright Footer", "color: red"] {
            assert!(!text.contains(noise), "found {:?} in {:?}", noise, text);
        }
    }

    #[test]
    fn test_tables_become_pipe_tables() {
        let html = "<h2>Benefits</h2><table><tr><th>Scheme</th><th>Amount</th></tr>\
                    <tr><td>PM-KISAN</td><td>6000</td></tr></table><p>After</p>";
        let markdown = html_to_markdown("https://example.com/", html).unwrap();

        assert!(
            markdown.contains("| Scheme | Amount |\n| --- | --- |\n| PM-KISAN | 6000 |"),
            "{:?}",
            markdown
        );
        assert!(markdown.contains("## Benefits"));
        assert!(markdown.contains("After"));
        assert!(!markdown.contains("CRAWLTABLE"));
    }

    #[test]
    fn test_ragged_and_nested_tables() {
        let html = "<table><tr><th>Name</th><th>Notes</th></tr>\
                    <tr><td>a|b</td></tr>\
                    <tr><td>outer</td><td><table><tr><td>inner</td></tr></table></td></tr></table>";
        let markdown = html_to_markdown("https://example.com/", html).unwrap();

        assert!(markdown.contains("| Name | Notes |\n| --- | --- |"), "{:?}", markdown);
        assert!(markdown.contains("| a\\|b |  |"), "{:?}", markdown);
        assert!(markdown.contains("| outer | inner |"), "{:?}", markdown);
        assert_eq!(markdown.matches("| --- |").count(), 1);
    }
}
