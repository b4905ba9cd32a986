//! Best-effort metadata extraction from HTML pages.
//!
//! Looks at Open Graph / Twitter / standard `<meta>` tags first, then JSON-LD,
//! then the document itself (`<title>`, first `<h1>`, `<time>`). Every field
//! is optional; a page with none of them yields an empty [`PageMetadata`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{Html, Selector};
use url::Url;

/// Metadata pulled from a single HTML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub site_name: Option<String>,
    /// Raw `og:type` value (e.g. `article`, `video.other`).
    pub og_type: Option<String>,
    pub image: Option<String>,
    /// Paragraph text from the main content area.
    pub body_text: Option<String>,
}

/// Parse `body` as HTML and pull out whatever metadata is present.
pub fn parse_metadata(body: &str, base_url: &Url) -> PageMetadata {
    let doc = Html::parse_document(body);
    let ld = json_ld(&doc);

    let title = meta_content(&doc, &[r#"meta[property="og:title"]"#, r#"meta[name="twitter:title"]"#])
        .or_else(|| ld.as_ref().and_then(|v| ld_string(v, "headline")))
        .or_else(|| first_text(&doc, "title"))
        .or_else(|| first_text(&doc, "h1"));

    let description = meta_content(
        &doc,
        &[
            r#"meta[property="og:description"]"#,
            r#"meta[name="description"]"#,
            r#"meta[name="twitter:description"]"#,
        ],
    )
    .or_else(|| ld.as_ref().and_then(|v| ld_string(v, "description")));

    let author = meta_content(
        &doc,
        &[
            r#"meta[name="author"]"#,
            r#"meta[property="article:author"]"#,
            r#"meta[name="byl"]"#,
        ],
    )
    .or_else(|| ld.as_ref().and_then(ld_author))
    .or_else(|| first_text(&doc, r#"[rel="author"]"#));

    let published_at = meta_content(
        &doc,
        &[
            r#"meta[property="article:published_time"]"#,
            r#"meta[itemprop="datePublished"]"#,
            r#"meta[name="date"]"#,
            r#"meta[name="pubdate"]"#,
            r#"meta[name="publish-date"]"#,
        ],
    )
    .or_else(|| ld.as_ref().and_then(|v| ld_string(v, "datePublished")))
    .or_else(|| first_attr(&doc, "time[datetime]", "datetime"))
    .and_then(|raw| parse_date(&raw));

    let site_name = meta_content(&doc, &[r#"meta[property="og:site_name"]"#]);
    let og_type = meta_content(&doc, &[r#"meta[property="og:type"]"#]).map(|t| t.to_lowercase());
    let image = meta_content(&doc, &[r#"meta[property="og:image"]"#, r#"meta[name="twitter:image"]"#])
        .and_then(|src| base_url.join(&src).ok())
        .map(|u| u.to_string());

    PageMetadata {
        title,
        description,
        author,
        published_at,
        site_name,
        og_type,
        image,
        body_text: main_text(&doc),
    }
}

/// Parse the date formats commonly found in page metadata.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        }
    }
    None
}

/// Collapse runs of whitespace and trim. Returns `None` for empty results.
pub(crate) fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

fn meta_content(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let sel = Selector::parse(sel).ok()?;
        doc.select(&sel)
            .filter_map(|el| el.value().attr("content"))
            .find_map(clean_text)
    })
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .map(|el| el.text().collect::<String>())
        .find_map(|t| clean_text(&t))
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .find_map(clean_text)
}

/// Paragraph text from `<article>`, else `<main>`, else the whole document.
fn main_text(doc: &Html) -> Option<String> {
    for scope in ["article p", "main p", r#"[role="main"] p"#, "p"] {
        let Ok(sel) = Selector::parse(scope) else {
            continue;
        };
        let paragraphs: Vec<String> = doc
            .select(&sel)
            .filter_map(|el| clean_text(&el.text().collect::<String>()))
            .collect();
        if !paragraphs.is_empty() {
            return Some(paragraphs.join("\n\n"));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

/// First JSON-LD object describing the page (unwraps `@graph` and arrays).
fn json_ld(doc: &Html) -> Option<serde_json::Value> {
    let sel = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    doc.select(&sel).find_map(|el| {
        let raw = el.text().collect::<String>();
        let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
        pick_ld_node(value)
    })
}

fn pick_ld_node(value: serde_json::Value) -> Option<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.into_iter().find_map(pick_ld_node),
        serde_json::Value::Object(ref map) => {
            if let Some(graph) = map.get("@graph") {
                return pick_ld_node(graph.clone());
            }
            let has_content_fields = map.contains_key("headline") || map.contains_key("datePublished");
            has_content_fields.then_some(value)
        }
        _ => None,
    }
}

fn ld_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().and_then(clean_text)
}

fn ld_author(value: &serde_json::Value) -> Option<String> {
    let author = value.get("author")?;
    let first = match author {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    match first {
        serde_json::Value::String(name) => clean_text(name),
        serde_json::Value::Object(_) => ld_string(first, "name"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example.com/2025/06/launch").unwrap()
    }

    #[test]
    fn prefers_open_graph() {
        let html = r#"<html><head>
            <title>Fallback Title | Site</title>
            <meta property="og:title" content="Launch Day: The &quot;Big&quot; One">
            <meta property="og:description" content="  Everything   shipped. ">
            <meta property="og:site_name" content="Example News">
            <meta property="og:type" content="article">
            <meta property="og:image" content="/img/cover.png">
            <meta name="author" content="Ada Lovelace">
            <meta property="article:published_time" content="2025-06-01T09:30:00+02:00">
        </head><body><article><p>First para.</p><p>Second   para.</p></article></body></html>"#;

        let meta = parse_metadata(html, &base());
        assert_eq!(meta.title.as_deref(), Some(r#"Launch Day: The "Big" One"#));
        assert_eq!(meta.description.as_deref(), Some("Everything shipped."));
        assert_eq!(meta.site_name.as_deref(), Some("Example News"));
        assert_eq!(meta.og_type.as_deref(), Some("article"));
        assert_eq!(meta.image.as_deref(), Some("https://news.example.com/img/cover.png"));
        assert_eq!(meta.author.as_deref(), Some("Ada Lovelace"));
        assert_eq!(
            meta.published_at,
            Some("2025-06-01T07:30:00Z".parse::<DateTime<Utc>>().unwrap())
        );
        assert_eq!(meta.body_text.as_deref(), Some("First para.\n\nSecond para."));
    }

    #[test]
    fn falls_back_to_document() {
        let html = r#"<html><head><title> Plain Page </title></head>
            <body><main><h1>Heading</h1><time datetime="2024-01-01">Jan 1</time><p>Body.</p></main></body></html>"#;
        let meta = parse_metadata(html, &base());
        assert_eq!(meta.title.as_deref(), Some("Plain Page"));
        assert!(meta.description.is_none());
        assert_eq!(
            meta.published_at,
            Some("2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn reads_json_ld() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[{"@type":"WebSite","name":"x"},
             {"@type":"NewsArticle","headline":"From LD","datePublished":"2023-03-04",
              "author":[{"@type":"Person","name":"Grace Hopper"}]}]}
        </script></head><body></body></html>"#;
        let meta = parse_metadata(html, &base());
        assert_eq!(meta.title.as_deref(), Some("From LD"));
        assert_eq!(meta.author.as_deref(), Some("Grace Hopper"));
        assert!(meta.published_at.is_some());
    }

    #[test]
    fn empty_document_yields_nothing() {
        let meta = parse_metadata("", &base());
        assert_eq!(meta, PageMetadata::default());
    }

    #[test]
    fn date_formats() {
        assert!(parse_date("2024-05-06").is_some());
        assert!(parse_date("Tue, 1 Jul 2003 10:52:37 +0200").is_some());
        assert!(parse_date("2024-05-06T10:00:00").is_some());
        assert!(parse_date("June 1, 2025").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
