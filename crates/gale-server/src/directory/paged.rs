//! Map plus fixed-size page index.
//!
//! A new entry goes into the lowest page with space, so pages freed by
//! removals are refilled before the index grows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::DirectoryError;

#[derive(Debug)]
struct Inner<T> {
    entries: HashMap<String, (usize, Arc<T>)>,
    pages: BTreeMap<usize, BTreeMap<String, Arc<T>>>,
}

/// Entries by id, bucketed into pages of at most `page_size`.
#[derive(Debug)]
pub struct PagedIndex<T> {
    page_size: usize,
    inner: RwLock<Inner<T>>,
}

impl<T> PagedIndex<T> {
    /// Empty index. A zero page size is treated as one.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                pages: BTreeMap::new(),
            }),
        }
    }

    /// Insert under `id` and return the page it landed on.
    pub fn insert(&self, id: &str, item: Arc<T>) -> Result<usize, DirectoryError> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(id) {
            return Err(DirectoryError::Duplicate(id.to_owned()));
        }
        let mut page = 0;
        while inner.pages.get(&page).is_some_and(|p| p.len() >= self.page_size) {
            page += 1;
        }
        let _ = inner
            .pages
            .entry(page)
            .or_default()
            .insert(id.to_owned(), Arc::clone(&item));
        let _ = inner.entries.insert(id.to_owned(), (page, item));
        Ok(page)
    }

    /// Remove `id`, returning the entry if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let (page, item) = inner.entries.remove(id)?;
        if let Some(bucket) = inner.pages.get_mut(&page) {
            let _ = bucket.remove(id);
            if bucket.is_empty() {
                let _ = inner.pages.remove(&page);
            }
        }
        Some(item)
    }

    /// Entry by id.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.inner.read().entries.get(id).map(|(_, item)| Arc::clone(item))
    }

    /// Every entry, page by page.
    pub fn all(&self) -> Vec<Arc<T>> {
        self.inner
            .read()
            .pages
            .values()
            .flat_map(|bucket| bucket.values().cloned())
            .collect()
    }

    /// Entries on `page`; empty for a page that does not exist.
    pub fn page(&self, page: usize) -> Vec<Arc<T>> {
        self.inner
            .read()
            .pages
            .get(&page)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fill(index: &PagedIndex<u32>, n: u32) -> Vec<usize> {
        (0..n).map(|i| index.insert(&format!("id{i:02}"), Arc::new(i)).unwrap()).collect()
    }

    #[test]
    fn pages_fill_in_order() {
        let index = PagedIndex::new(2);
        assert_eq!(fill(&index, 5), vec![0, 0, 1, 1, 2]);
        assert_eq!(index.page(1).iter().map(|v| **v).collect::<Vec<_>>(), vec![2, 3]);
        assert!(index.page(7).is_empty());
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn freed_slot_is_reused_first() {
        let index = PagedIndex::new(2);
        let _ = fill(&index, 4);
        assert!(index.remove("id00").is_some());
        assert_eq!(index.insert("late", Arc::new(99)).unwrap(), 0);
    }

    #[test]
    fn duplicate_rejected() {
        let index = PagedIndex::new(10);
        let _ = index.insert("a", Arc::new(1)).unwrap();
        assert_matches!(
            index.insert("a", Arc::new(2)),
            Err(DirectoryError::Duplicate(id)) if id == "a"
        );
        assert_eq!(*index.get("a").unwrap(), 1);
    }

    #[test]
    fn remove_missing_is_none() {
        let index: PagedIndex<u32> = PagedIndex::new(1);
        assert!(index.remove("nope").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn all_lists_every_page() {
        let index = PagedIndex::new(3);
        let _ = fill(&index, 7);
        assert_eq!(index.all().len(), 7);
    }
}
