//! Per-category write locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use curator_shared::Category;

/// Serialises read-merge-write cycles per category across overlapping runs.
///
/// Cloning shares the same locks.
#[derive(Debug, Clone)]
pub struct CategoryLocks {
    locks: Arc<HashMap<Category, Arc<Mutex<()>>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct CategoryGuard {
    categories: Vec<Category>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl CategoryGuard {
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }
}

impl CategoryLocks {
    pub fn new() -> Self {
        let locks = Category::PERSISTED
            .into_iter()
            .map(|c| (c, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            locks: Arc::new(locks),
        }
    }

    /// Lock the given categories, always in [`Category::PERSISTED`] order.
    pub async fn acquire(&self, categories: &[Category]) -> CategoryGuard {
        let ordered: Vec<Category> = Category::PERSISTED
            .into_iter()
            .filter(|c| categories.contains(c))
            .collect();

        let mut guards = Vec::with_capacity(ordered.len());
        for category in &ordered {
            if let Some(lock) = self.locks.get(category) {
                guards.push(lock.clone().lock_owned().await);
                trace!(%category, "category lock acquired");
            }
        }

        CategoryGuard {
            categories: ordered,
            _guards: guards,
        }
    }

    /// Lock every persisted category.
    pub async fn acquire_all(&self) -> CategoryGuard {
        self.acquire(&Category::PERSISTED).await
    }
}

impl Default for CategoryLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn orders_and_skips_unknown() {
        let locks = CategoryLocks::new();
        let guard = locks
            .acquire(&[Category::Video, Category::Unknown, Category::News])
            .await;
        assert_eq!(guard.categories(), &[Category::News, Category::Video]);
    }

    #[tokio::test]
    async fn second_holder_waits() {
        let locks = CategoryLocks::new();
        let guard = locks.acquire(&[Category::News]).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire(&[Category::News]).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn disjoint_categories_do_not_block() {
        let locks = CategoryLocks::new();
        let _news = locks.acquire(&[Category::News]).await;
        let video = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&[Category::Video])).await;
        assert!(video.is_ok());
    }
}
