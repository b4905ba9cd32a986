//! Stable entry identifiers.

use std::collections::HashMap;

use curator_shared::{Category, ContentEntry, short_hash, slug_from_url, slugify};

/// Hands out ids that are unique within a category.
///
/// An id already owned by the same key is reused, so re-ingesting a URL
/// resolves to the id it had before.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    taken: HashMap<Category, HashMap<String, String>>,
}

impl IdAllocator {
    pub(crate) fn new<'a>(entries: impl IntoIterator<Item = (&'a ContentEntry, String)>) -> Self {
        let mut allocator = Self::default();
        for (entry, key) in entries {
            allocator
                .taken
                .entry(entry.category)
                .or_default()
                .entry(entry.id.clone())
                .or_insert(key);
        }
        allocator
    }

    pub(crate) fn allocate(&mut self, category: Category, title: &str, key: &str) -> String {
        let base = base_slug(title, key);
        let hash = short_hash(key);
        let ids = self.taken.entry(category).or_default();

        let free = |id: &str| ids.get(id).is_none_or(|owner| owner == key);

        let mut id = base.clone();
        if !free(&id) {
            id = format!("{base}-{hash}");
        }
        let mut n = 2;
        while !free(&id) {
            id = format!("{base}-{hash}-{n}");
            n += 1;
        }

        ids.insert(id.clone(), key.to_string());
        id
    }
}

/// Title slug, else URL slug, else `entry`.
fn base_slug(title: &str, key: &str) -> String {
    let from_title = slugify(title);
    if !from_title.is_empty() {
        return from_title;
    }
    let from_url = slug_from_url(key);
    if !from_url.is_empty() {
        return from_url;
    }
    "entry".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_slug_first() {
        let mut ids = IdAllocator::default();
        let id = ids.allocate(Category::News, "Acme Raises $10M!", "https://a.example/x");
        assert_eq!(id, "acme-raises-10m");
    }

    #[test]
    fn falls_back_to_url() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.allocate(Category::News, "", "https://a.example/posts/hello-world"), "hello-world");
        assert_eq!(ids.allocate(Category::News, " ", "https://b.example/"), "b-example");
    }

    #[test]
    fn collisions_get_hash_suffix() {
        let mut ids = IdAllocator::default();
        let first = ids.allocate(Category::News, "Weekly digest", "https://a.example/1");
        let second = ids.allocate(Category::News, "Weekly digest", "https://a.example/2");
        assert_eq!(first, "weekly-digest");
        assert_eq!(second, format!("weekly-digest-{}", short_hash("https://a.example/2")));

        // other categories have their own namespace
        let other = ids.allocate(Category::Video, "Weekly digest", "https://a.example/3");
        assert_eq!(other, "weekly-digest");
    }

    #[test]
    fn same_key_reuses_id() {
        let mut ids = IdAllocator::default();
        let a = ids.allocate(Category::Catalog, "Guide", "https://a.example/g");
        let b = ids.allocate(Category::Catalog, "Guide", "https://a.example/g");
        assert_eq!(a, b);
    }
}
