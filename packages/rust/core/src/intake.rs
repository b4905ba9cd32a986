//! Turns a batch of raw inputs into the list of URLs a run will process.
//!
//! Explicit `urls` are taken as given. URLs in the free-text `body` are
//! harvested, and mailing-list noise (unsubscribe links, tracking pixels,
//! preference centres) is dropped. Candidates are de-duplicated across the
//! whole batch by canonical URL; the first occurrence wins.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use curator_shared::{RawInput, canonical_url};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`{}|\\^\[\]]+"#).expect("valid regex"));

/// Characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '\'', '"', '>', '*'];

const NOISE_PATTERNS: &[&str] = &[
    "unsubscribe",
    "list-manage.com",
    "optout",
    "opt-out",
    "email-preferences",
    "manage-preferences",
    "/track/open",
    "/pixel",
    "pixel.gif",
    "view-in-browser",
];

/// One URL to process, with the input it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// URL as received (trimmed).
    pub url: String,
    pub received_at: DateTime<Utc>,
}

/// Flatten and de-duplicate the URLs of a batch, preserving input order.
pub fn collect(inputs: &[RawInput]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for input in inputs {
        let explicit = input.urls.iter().map(|u| u.trim().to_string());
        let harvested = input
            .body
            .as_deref()
            .map(harvest_urls)
            .unwrap_or_default();

        for url in explicit.chain(harvested) {
            if url.is_empty() {
                continue;
            }
            // dedupe on the canonical form; unparseable URLs on their raw text
            let key = canonical_url(&url).unwrap_or_else(|_| url.clone());
            if !seen.insert(key) {
                continue;
            }
            candidates.push(Candidate {
                url,
                received_at: input.received_at,
            });
        }
    }

    candidates
}

/// URLs found in free text, minus mail noise, in order of appearance.
pub fn harvest_urls(body: &str) -> Vec<String> {
    URL_RE
        .find_iter(body)
        .map(|m| trim_trailing(m.as_str()))
        .filter(|url| !is_noise(url))
        .map(str::to_string)
        .collect()
}

fn trim_trailing(url: &str) -> &str {
    let mut trimmed = url.trim_end_matches(TRAILING_PUNCTUATION);
    // keep a closing paren that belongs to the URL, e.g. wiki links
    if url[trimmed.len()..].starts_with(')') && trimmed.contains('(') && !trimmed.contains(')') {
        trimmed = &url[..trimmed.len() + 1];
    }
    trimmed
}

fn is_noise(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    NOISE_PATTERNS.iter().any(|p| lower.contains(p))
}
