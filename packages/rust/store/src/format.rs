//! Category file codec.
//!
//! A category file is a sequence of blocks. Each block is a TOML header
//! between `+++` lines, carrying every [`ContentEntry`] field in declaration
//! order, followed by the free-text excerpt:
//!
//! ```text
//! +++
//! id = "acme-launch"
//! category = "news"
//! url = "https://example.com/acme"
//! ...
//! +++
//! Excerpt text.
//!
//! +++
//! ...
//! ```
//!
//! Excerpt lines that look like a delimiter are escaped with a leading `\`.

use curator_shared::{ContentEntry, CuratorError, Result, StoreErrorKind};

pub const DELIMITER: &str = "+++";

/// Render entries into a category file. Empty input renders to `""`.
pub fn render(entries: &[ContentEntry]) -> Result<String> {
    let mut out = String::new();

    for entry in entries {
        let header = toml::to_string(entry).map_err(|e| {
            format_error(format!("cannot render header for '{}': {e}", entry.id))
        })?;
        if header.lines().any(|l| l == DELIMITER) {
            return Err(format_error(format!(
                "header for '{}' contains a delimiter line",
                entry.id
            )));
        }

        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&header);
        if !header.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push('\n');

        if let Some(excerpt) = entry.excerpt.as_deref().map(str::trim_end).filter(|e| !e.is_empty()) {
            for line in excerpt.lines() {
                if looks_like_delimiter(line) {
                    out.push('\\');
                }
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
    }

    Ok(out)
}

/// Parse a category file produced by [`render`] (or edited by hand).
pub fn parse(content: &str) -> Result<Vec<ContentEntry>> {
    let mut entries = Vec::new();
    let mut lines = content.lines().enumerate().peekable();

    loop {
        while lines.next_if(|(_, l)| l.trim().is_empty()).is_some() {}

        match lines.next() {
            None => break,
            Some((_, line)) if line.trim_end() == DELIMITER => {}
            Some((n, line)) => {
                return Err(format_error(format!(
                    "line {}: expected '{DELIMITER}', found '{line}'",
                    n + 1
                )));
            }
        }

        let mut header = String::new();
        let mut closed = false;
        for (_, line) in lines.by_ref() {
            if line.trim_end() == DELIMITER {
                closed = true;
                break;
            }
            header.push_str(line);
            header.push('\n');
        }
        if !closed {
            return Err(format_error("unterminated header block"));
        }

        let mut body: Vec<String> = Vec::new();
        while let Some((_, line)) = lines.next_if(|(_, l)| l.trim_end() != DELIMITER) {
            body.push(unescape(line).to_string());
        }
        while body.last().is_some_and(|l| l.trim().is_empty()) {
            body.pop();
        }

        let mut entry: ContentEntry = toml::from_str(&header)
            .map_err(|e| format_error(format!("invalid entry header: {e}")))?;
        let excerpt = body.join("\n");
        entry.excerpt = (!excerpt.is_empty()).then_some(excerpt);
        entries.push(entry);
    }

    Ok(entries)
}

fn looks_like_delimiter(line: &str) -> bool {
    line.trim_start_matches('\\').trim_end() == DELIMITER
}

fn unescape(line: &str) -> &str {
    if line.starts_with('\\') && looks_like_delimiter(line) {
        &line[1..]
    } else {
        line
    }
}

fn format_error(message: impl Into<String>) -> CuratorError {
    CuratorError::store(StoreErrorKind::Format, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use curator_shared::{Category, ContentType, PublishStatus};

    fn entry(id: &str) -> ContentEntry {
        ContentEntry {
            id: id.into(),
            category: Category::News,
            url: format!("https://example.com/{id}"),
            title: "Title".into(),
            description: String::new(),
            status: PublishStatus::Published,
            featured: false,
            confidence: 0.85,
            subcategory: None,
            tags: Vec::new(),
            author: None,
            published_at: None,
            received_at: None,
            source_domain: None,
            content_type: None,
            video_platform: None,
            video_id: None,
            thumbnail_url: None,
            last_modified: "2025-06-01T00:00:00Z".parse().unwrap(),
            excerpt: None,
        }
    }

    #[test]
    fn reserved_characters_round_trip() {
        let mut tricky = entry("tricky");
        tricky.title = r#"Breaking: "Quotes", colons: and # hashes = fine"#.into();
        tricky.description = "Line with +++ inside and 'single' quotes \\ backslash".into();
        tricky.tags = vec!["a:b".into(), "c\"d".into()];
        tricky.author = Some("O'Brien".into());
        tricky.published_at = Some("2024-02-29T23:59:59.123456789Z".parse::<DateTime<Utc>>().unwrap());
        tricky.content_type = Some(ContentType::Report);
        tricky.featured = true;
        tricky.confidence = 0.7071067811865476;
        tricky.excerpt = Some("First line.\n\n+++\n\\+++\nLast line.".into());

        let entries = vec![tricky, entry("plain")];
        let rendered = render(&entries).unwrap();
        let parsed = parse(&rendered).unwrap();
        assert_eq!(parsed, entries);

        // and the output is stable
        assert_eq!(render(&parsed).unwrap(), rendered);
    }

    #[test]
    fn header_keeps_field_order() {
        let rendered = render(&[entry("x")]).unwrap();
        let keys: Vec<&str> = rendered
            .lines()
            .filter_map(|l| l.split_once(" = ").map(|(k, _)| k))
            .collect();
        assert_eq!(
            keys,
            vec![
                "id",
                "category",
                "url",
                "title",
                "description",
                "status",
                "featured",
                "confidence",
                "last_modified"
            ]
        );
    }

    #[test]
    fn empty_file_has_no_entries() {
        assert_eq!(render(&[]).unwrap(), "");
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n").unwrap().is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("just some text").is_err());
        assert!(parse("+++\nid = \"x\"\n").is_err());
        let err = parse("+++\nnot toml at all\n+++\n").unwrap_err();
        assert!(matches!(
            err,
            CuratorError::Store {
                kind: StoreErrorKind::Format,
                ..
            }
        ));
    }

    #[test]
    fn hand_edited_file_parses() {
        let content = "\n+++\nid = \"hand\"\ncategory = \"catalog\"\nurl = \"https://x.example/\"\n\
                       title = \"Hand\"\nstatus = \"review\"\nconfidence = 0.5\n\
                       last_modified = \"2025-01-01T00:00:00Z\"\n+++\n\n";
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category, Category::Catalog);
        assert_eq!(parsed[0].description, "");
        assert!(parsed[0].excerpt.is_none());
    }
}
