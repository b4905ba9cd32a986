//! Reconciler: merges classified records into the stored corpus.
//!
//! Entries are keyed by canonical URL. Existing entries win: incoming data
//! only fills fields the entry does not have yet, so manual curation is
//! never overwritten. The merged set is ordered newest first with undated
//! entries last in encounter order. Merging the same batch twice is a no-op.

mod ids;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use curator_shared::{
    Category, ClassifiedRecord, ConfidenceBand, ContentEntry, CuratorError, PublishStatus, Result,
    StoreErrorKind, canonical_url,
};

use ids::IdAllocator;

/// Output of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// Full merged corpus, all categories, in store order.
    pub entries: Vec<ContentEntry>,
    pub added_count: usize,
    pub updated_count: usize,
    /// Incoming records that matched an entry and changed nothing.
    pub skipped_count: usize,
}

impl MergeResult {
    /// Entries of one category, in store order.
    pub fn category(&self, category: Category) -> Vec<ContentEntry> {
        self.entries
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }
}

/// Dedup key for a URL: its canonical form, or the raw string if it does not parse.
pub fn dedup_key(url: &str) -> String {
    canonical_url(url).unwrap_or_else(|_| url.trim().to_string())
}

/// Merge `incoming` into `existing`.
///
/// Records in the `Unknown` category or the unclassified band are left out;
/// they are triage items, not content. `now` stamps `last_modified` on
/// entries that are created or actually changed.
#[instrument(skip_all, fields(existing = existing.len(), incoming = incoming.len()))]
pub fn merge(
    existing: &[ContentEntry],
    incoming: &[ClassifiedRecord],
    now: DateTime<Utc>,
) -> Result<MergeResult> {
    let mut entries = existing.to_vec();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        by_key.entry(dedup_key(&entry.url)).or_insert(idx);
    }
    let mut ids = IdAllocator::new(entries.iter().map(|e| (e, dedup_key(&e.url))));

    let mut added_keys = HashSet::new();
    let (mut added, mut updated, mut skipped) = (0, 0, 0);

    for record in incoming {
        let Some((category, status)) = placement(record) else {
            continue;
        };
        let key = dedup_key(&record.url);

        match by_key.get(&key) {
            Some(&idx) => {
                let entry = &mut entries[idx];
                let changed = fill_absent(entry, record);
                if changed {
                    entry.last_modified = now;
                }
                if changed && !added_keys.contains(&key) {
                    updated += 1;
                } else {
                    skipped += 1;
                }
            }
            None => {
                let id = ids.allocate(category, &record.title, &key);
                debug!(%id, %category, url = %key, "new entry");
                by_key.insert(key.clone(), entries.len());
                entries.push(new_entry(record, id, key.clone(), category, status, now));
                added_keys.insert(key);
                added += 1;
            }
        }
    }

    sort_by_date(&mut entries);
    validate(&entries)?;

    Ok(MergeResult {
        entries,
        added_count: added,
        updated_count: updated,
        skipped_count: skipped,
    })
}

/// Check the invariants the store relies on: persisted categories only,
/// unique ids per category, unique keys overall.
pub fn validate(entries: &[ContentEntry]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut keys = HashSet::new();

    for entry in entries {
        if !entry.category.is_persisted() {
            return Err(CuratorError::store(
                StoreErrorKind::MergeConflict,
                format!("entry '{}' has category {}", entry.id, entry.category),
            ));
        }
        if !ids.insert((entry.category, entry.id.as_str())) {
            return Err(CuratorError::store(
                StoreErrorKind::MergeConflict,
                format!("duplicate id '{}' in {}", entry.id, entry.category),
            ));
        }
        if !keys.insert(dedup_key(&entry.url)) {
            return Err(CuratorError::store(
                StoreErrorKind::MergeConflict,
                format!("duplicate url {}", entry.url),
            ));
        }
    }
    Ok(())
}

/// Newest first by publish (else received) date; undated entries last.
/// The sort is stable, so ties keep encounter order.
pub fn sort_by_date(entries: &mut [ContentEntry]) {
    entries.sort_by(|a, b| match (a.sort_date(), b.sort_date()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn placement(record: &ClassifiedRecord) -> Option<(Category, PublishStatus)> {
    let status = match record.band {
        ConfidenceBand::AutoPublish => PublishStatus::Published,
        ConfidenceBand::NeedsReview => PublishStatus::Review,
        ConfidenceBand::Unclassified => return None,
    };
    match record.category {
        Category::News | Category::Catalog | Category::Video => Some((record.category, status)),
        Category::Unknown => None,
    }
}

fn new_entry(
    record: &ClassifiedRecord,
    id: String,
    url: String,
    category: Category,
    status: PublishStatus,
    now: DateTime<Utc>,
) -> ContentEntry {
    let extracted = &record.record;
    let meta = &extracted.metadata;
    ContentEntry {
        id,
        category,
        url,
        title: record.title.clone(),
        description: record.description.clone(),
        status,
        featured: false,
        confidence: record.confidence,
        subcategory: record.subcategory.clone(),
        tags: record.tags.clone(),
        author: meta.author.clone(),
        published_at: meta.published_at,
        received_at: extracted.received_at,
        source_domain: meta.source_domain.clone(),
        content_type: meta.content_type,
        video_platform: meta.video.as_ref().map(|v| v.platform.clone()),
        video_id: meta.video.as_ref().map(|v| v.id.clone()),
        thumbnail_url: meta.thumbnail_url.clone(),
        last_modified: now,
        excerpt: excerpt(record),
    }
}

/// Fill fields the entry lacks. Returns whether anything changed.
fn fill_absent(entry: &mut ContentEntry, record: &ClassifiedRecord) -> bool {
    let extracted = &record.record;
    let meta = &extracted.metadata;
    let mut changed = false;

    if entry.title.trim().is_empty() && !record.title.trim().is_empty() {
        entry.title = record.title.clone();
        changed = true;
    }
    if entry.description.trim().is_empty() && !record.description.trim().is_empty() {
        entry.description = record.description.clone();
        changed = true;
    }
    if entry.tags.is_empty() && !record.tags.is_empty() {
        entry.tags = record.tags.clone();
        changed = true;
    }

    changed |= fill(&mut entry.subcategory, record.subcategory.clone());
    changed |= fill(&mut entry.author, meta.author.clone());
    changed |= fill(&mut entry.published_at, meta.published_at);
    changed |= fill(&mut entry.received_at, extracted.received_at);
    changed |= fill(&mut entry.source_domain, meta.source_domain.clone());
    changed |= fill(&mut entry.content_type, meta.content_type);
    changed |= fill(&mut entry.video_platform, meta.video.as_ref().map(|v| v.platform.clone()));
    changed |= fill(&mut entry.video_id, meta.video.as_ref().map(|v| v.id.clone()));
    changed |= fill(&mut entry.thumbnail_url, meta.thumbnail_url.clone());
    changed |= fill(&mut entry.excerpt, excerpt(record));
    changed
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_none() && value.is_some() {
        *slot = value;
        true
    } else {
        false
    }
}

fn excerpt(record: &ClassifiedRecord) -> Option<String> {
    record
        .record
        .body_text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_shared::ExtractedRecord;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        at("2026-01-01T00:00:00Z")
    }

    fn classified(url: &str, title: &str, category: Category, confidence: f64) -> ClassifiedRecord {
        let band = if confidence >= 0.7 {
            ConfidenceBand::AutoPublish
        } else if confidence >= 0.4 {
            ConfidenceBand::NeedsReview
        } else {
            ConfidenceBand::Unclassified
        };
        let category = if band == ConfidenceBand::Unclassified {
            Category::Unknown
        } else {
            category
        };
        ClassifiedRecord {
            record: ExtractedRecord::url_only(url, url),
            category,
            subcategory: None,
            tags: Vec::new(),
            confidence,
            band,
            title: title.to_string(),
            description: String::new(),
            url: url.to_string(),
        }
    }

    fn dated(mut record: ClassifiedRecord, date: &str) -> ClassifiedRecord {
        record.record.metadata.published_at = Some(at(date));
        record
    }

    #[test]
    fn inserts_new_entries() {
        let incoming = vec![
            classified("https://a.example/one", "One", Category::News, 0.85),
            classified("https://a.example/two", "Two", Category::Catalog, 0.5),
        ];
        let result = merge(&[], &incoming, now()).unwrap();

        assert_eq!(result.added_count, 2);
        assert_eq!(result.entries.len(), 2);
        let one = &result.entries[0];
        assert_eq!(one.id, "one");
        assert_eq!(one.status, PublishStatus::Published);
        assert_eq!(one.last_modified, now());
        assert!(!one.featured);
        assert_eq!(result.entries[1].status, PublishStatus::Review);
    }

    #[test]
    fn low_confidence_is_never_persisted() {
        let incoming = vec![
            classified("https://a.example/low", "Low", Category::News, 0.39),
            classified("https://a.example/high", "High", Category::News, 0.85),
        ];
        let result = merge(&[], &incoming, now()).unwrap();
        let urls: Vec<&str> = result.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/high"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut with_body = classified("https://a.example/x", "X", Category::News, 0.9);
        with_body.record.body_text = Some("Body text.".into());
        with_body.record.metadata.author = Some("Ada".into());
        let incoming = vec![
            dated(with_body, "2025-06-01T00:00:00Z"),
            classified("https://a.example/y", "Y", Category::Video, 0.95),
            classified("https://a.example/z", "Z", Category::Catalog, 0.45),
        ];

        let once = merge(&[], &incoming, now()).unwrap();
        let twice = merge(&once.entries, &incoming, at("2026-02-01T00:00:00Z")).unwrap();

        assert_eq!(twice.entries, once.entries);
        assert_eq!(twice.added_count, 0);
        assert_eq!(twice.updated_count, 0);
        assert_eq!(twice.skipped_count, 3);
    }

    #[test]
    fn merge_into_curated_store_is_idempotent() {
        let seeded = merge(
            &[],
            &[
                classified("https://a.example/post", "Post", Category::News, 0.9),
                classified("https://a.example/kit", "Kit", Category::Catalog, 0.9),
            ],
            at("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        let mut existing = seeded.entries;
        existing[0].title = "Edited post".into();
        existing[0].featured = true;

        let mut tagged = classified("https://a.example/post?utm_source=a", "Fresh", Category::News, 0.9);
        tagged.record.metadata.author = Some("Ada".into());
        let incoming = vec![
            tagged,
            classified("https://a.example/post?fbclid=b", "Fresh", Category::News, 0.9),
            classified("https://a.example/new", "New", Category::Video, 0.95),
        ];

        let once = merge(&existing, &incoming, now()).unwrap();
        assert_eq!(once.entries.len(), 3);
        assert_eq!((once.added_count, once.updated_count, once.skipped_count), (1, 1, 1));

        let twice = merge(&once.entries, &incoming, at("2026-02-01T00:00:00Z")).unwrap();
        assert_eq!(twice.entries, once.entries);
        assert_eq!((twice.added_count, twice.updated_count, twice.skipped_count), (0, 0, 3));

        let post = twice
            .entries
            .iter()
            .find(|e| e.url == "https://a.example/post")
            .unwrap();
        assert_eq!(post.title, "Edited post");
        assert!(post.featured);
        assert_eq!(post.author.as_deref(), Some("Ada"));
        assert_eq!(post.last_modified, now());
    }

    #[test]
    fn tracking_params_collapse_to_one_entry() {
        let incoming = vec![
            classified("https://a.example/post?utm_source=mail", "Post", Category::News, 0.9),
            classified("https://a.example/post?utm_campaign=x&fbclid=1", "Post", Category::News, 0.9),
        ];
        let result = merge(&[], &incoming, now()).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].url, "https://a.example/post");
        assert_eq!(result.added_count, 1);
        assert_eq!(result.skipped_count, 1);
    }

    #[test]
    fn orders_newest_first_with_undated_last() {
        let incoming = vec![
            dated(classified("https://a.example/old", "Old", Category::News, 0.9), "2024-01-01T00:00:00Z"),
            classified("https://a.example/undated", "Undated", Category::News, 0.9),
            dated(classified("https://a.example/new", "New", Category::News, 0.9), "2025-06-01T00:00:00Z"),
        ];
        let result = merge(&[], &incoming, now()).unwrap();
        let ids: Vec<&str> = result.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
    }

    #[test]
    fn undated_entries_keep_encounter_order() {
        let incoming = vec![
            classified("https://a.example/b", "B", Category::News, 0.9),
            classified("https://a.example/a", "A", Category::News, 0.9),
            classified("https://a.example/c", "C", Category::News, 0.9),
        ];
        let result = merge(&[], &incoming, now()).unwrap();
        let ids: Vec<&str> = result.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn curated_fields_survive() {
        let seeded = merge(
            &[],
            &[classified("https://a.example/x", "Original", Category::News, 0.9)],
            at("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        let mut curated = seeded.entries[0].clone();
        curated.title = "Hand-edited title".into();
        curated.description = "Written by an editor".into();
        curated.featured = true;

        let mut incoming = classified("https://a.example/x?utm_source=n", "Fresh title", Category::Catalog, 0.99);
        incoming.description = "Fresh description".into();
        incoming.record.metadata.author = Some("Grace".into());

        let result = merge(&[curated], &[incoming], now()).unwrap();
        let entry = &result.entries[0];
        assert_eq!(entry.title, "Hand-edited title");
        assert_eq!(entry.description, "Written by an editor");
        assert!(entry.featured);
        assert_eq!(entry.category, Category::News);
        assert_eq!(entry.id, "original");
        assert_eq!(entry.author.as_deref(), Some("Grace"));
        assert_eq!(entry.last_modified, now());
        assert_eq!(result.updated_count, 1);
    }

    #[test]
    fn unchanged_entry_keeps_last_modified() {
        let first = merge(
            &[],
            &[classified("https://a.example/x", "X", Category::News, 0.9)],
            at("2025-01-01T00:00:00Z"),
        )
        .unwrap();
        let again = merge(
            &first.entries,
            &[classified("https://a.example/x", "Other", Category::News, 0.9)],
            now(),
        )
        .unwrap();
        assert_eq!(again.entries[0].last_modified, at("2025-01-01T00:00:00Z"));
        assert_eq!(again.skipped_count, 1);
    }

    #[test]
    fn title_collisions_get_distinct_ids() {
        let incoming = vec![
            classified("https://a.example/1", "Weekly digest", Category::News, 0.9),
            classified("https://b.example/2", "Weekly digest", Category::News, 0.9),
        ];
        let result = merge(&[], &incoming, now()).unwrap();
        assert_ne!(result.entries[0].id, result.entries[1].id);
        assert!(result.entries[1].id.starts_with("weekly-digest-"));
    }

    #[test]
    fn category_view() {
        let incoming = vec![
            classified("https://a.example/n", "N", Category::News, 0.9),
            classified("https://a.example/v", "V", Category::Video, 0.9),
        ];
        let result = merge(&[], &incoming, now()).unwrap();
        assert_eq!(result.category(Category::Video).len(), 1);
        assert!(result.category(Category::Catalog).is_empty());
    }

    #[test]
    fn validate_rejects_duplicates() {
        let result = merge(
            &[],
            &[classified("https://a.example/x", "X", Category::News, 0.9)],
            now(),
        )
        .unwrap();
        let mut twin = result.entries[0].clone();
        twin.url = "https://a.example/other".into();
        let entries = vec![result.entries[0].clone(), twin];

        let err = validate(&entries).unwrap_err();
        assert!(matches!(
            err,
            CuratorError::Store {
                kind: StoreErrorKind::MergeConflict,
                ..
            }
        ));
    }
}
