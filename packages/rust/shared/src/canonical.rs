//! URL canonicalisation and slug helpers.
//!
//! The canonical URL is the dedup key for the whole pipeline, so every
//! component derives it through [`canonical_url`].

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{CuratorError, Result};

/// Query parameters that only carry campaign/referrer tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "si", "ref", "ref_src",
    "_hsenc", "_hsmi", "mkt_tok", "spm", "feature",
];

/// Maximum slug length before the optional hash suffix.
const MAX_SLUG_LEN: usize = 60;

/// Whether a query parameter name is a tracking parameter.
pub fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Parse an absolute HTTP(S) URL, rejecting anything else.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| CuratorError::invalid_input(format!("malformed URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CuratorError::invalid_input(format!(
                "unsupported URL scheme '{other}' in '{raw}'"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(CuratorError::invalid_input(format!("URL has no host: '{raw}'")));
    }

    Ok(url)
}

/// Extract a YouTube video id from the known URL shapes.
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.strip_prefix("m.").unwrap_or(host);

    let id = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts") | Some("embed") | Some("live") | Some("v") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        }
        _ => None,
    }?;

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// Extract a numeric Vimeo video id.
pub fn vimeo_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    if host != "vimeo.com" && host != "www.vimeo.com" && host != "player.vimeo.com" {
        return None;
    }
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .find(|s| s.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Normalize a URL into its canonical dedup key.
///
/// Lowercases the host, drops the fragment and tracking parameters, trims a
/// trailing slash (except at the root) and rewrites video share links to the
/// platform's watch URL.
pub fn canonical_url(raw: &str) -> Result<String> {
    let url = parse_http_url(raw)?;

    if let Some(id) = youtube_video_id(&url) {
        return Ok(format!("https://www.youtube.com/watch?v={id}"));
    }
    if let Some(id) = vimeo_video_id(&url) {
        return Ok(format!("https://vimeo.com/{id}"));
    }

    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        canonical.set_query(None);
    } else {
        canonical.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = canonical.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        canonical.set_path(path.trim_end_matches('/'));
    }

    Ok(canonical.to_string())
}

/// Generate a URL-safe slug from arbitrary text.
pub fn slugify(text: &str) -> String {
    let slug = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.chars().count() <= MAX_SLUG_LEN {
        return slug;
    }

    let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Slug derived from a URL's host and path, for records without a title.
pub fn slug_from_url(canonical: &str) -> String {
    let Ok(url) = Url::parse(canonical) else {
        return slugify(canonical);
    };
    let path = url
        .path()
        .trim_matches('/')
        .trim_end_matches(".html")
        .trim_end_matches(".htm")
        .trim_end_matches(".pdf");

    let last = path.rsplit('/').find(|s| !s.is_empty());
    match last {
        Some(segment) => slugify(segment),
        None => slugify(url.host_str().unwrap_or("entry")),
    }
}

/// First 8 hex characters of SHA-256 over `input`.
pub fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_params_and_fragment() {
        let a = canonical_url("https://Example.com/post/1?utm_source=mail&utm_medium=x#top").unwrap();
        let b = canonical_url("https://example.com/post/1?fbclid=abc").unwrap();
        assert_eq!(a, "https://example.com/post/1");
        assert_eq!(a, b);
    }

    #[test]
    fn keeps_meaningful_query_in_order() {
        let url = canonical_url("https://example.com/search?q=rust&utm_campaign=z&page=2").unwrap();
        assert_eq!(url, "https://example.com/search?q=rust&page=2");
    }

    #[test]
    fn trims_trailing_slash_except_root() {
        assert_eq!(
            canonical_url("https://example.com/guide/").unwrap(),
            "https://example.com/guide"
        );
        assert_eq!(canonical_url("https://example.com/").unwrap(), "https://example.com/");
    }

    #[test]
    fn drops_default_port() {
        assert_eq!(
            canonical_url("https://example.com:443/a").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn youtube_share_forms_collapse() {
        let expected = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        assert_eq!(canonical_url("https://youtu.be/dQw4w9WgXcQ?si=abc").unwrap(), expected);
        assert_eq!(
            canonical_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&utm_source=x").unwrap(),
            expected
        );
        assert_eq!(
            canonical_url("https://youtube.com/shorts/dQw4w9WgXcQ").unwrap(),
            expected
        );
    }

    #[test]
    fn vimeo_ids() {
        assert_eq!(
            canonical_url("https://vimeo.com/76979871?share=copy").unwrap(),
            "https://vimeo.com/76979871"
        );
    }

    #[test]
    fn rejects_non_http() {
        assert!(canonical_url("ftp://example.com/file").is_err());
        assert!(canonical_url("not a url").is_err());
        assert!(canonical_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Hello, World: A \"Quoted\" Title"), "hello-world-a-quoted-title");
        assert_eq!(slugify("   "), "");
    }

    #[test]
    fn slugify_truncates() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= 60);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn slug_from_url_uses_last_segment() {
        assert_eq!(slug_from_url("https://example.com/reports/annual-2024.pdf"), "annual-2024");
        assert_eq!(slug_from_url("https://example.com/"), "example-com");
    }

    #[test]
    fn short_hash_is_stable() {
        assert_eq!(short_hash("hello world"), "b94d27b9");
    }
}
