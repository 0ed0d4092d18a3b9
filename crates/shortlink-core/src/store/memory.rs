//! In-process [`LinkStore`] backed by hash maps.
//!
//! All state sits behind one `tokio::sync::RwLock`. Reads take the shared
//! lock; every write takes the exclusive lock for the whole check-and-insert,
//! which is what makes [`UpsertMode::InsertOnly`] atomic here. The lock is
//! never held across an await point other than its own acquisition.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, ShortlinkError};
use crate::link::{LinkRecord, LinkStatus, NewLink};
use crate::normalize::NormalizedUrl;
use crate::slug::Slug;

use super::{LinkStore, UpsertMode, MAX_LISTING};

/// A volatile store, suitable for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Records keyed by slug, each tagged with its insertion sequence.
    by_slug: HashMap<Slug, Entry>,

    /// Normalized URL -> (insertion sequence -> slug).
    ///
    /// Kept in step with `by_slug` on every write so that both lookup paths
    /// always agree.
    by_url: HashMap<String, BTreeMap<u64, Slug>>,

    next_seq: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    record: LinkRecord,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_slug.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_slug.is_empty()
    }

    /// Snapshot of every record, in insertion order.
    pub async fn records(&self) -> Vec<LinkRecord> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner.by_slug.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.record.clone()).collect()
    }
}

impl Inner {
    fn insert(&mut self, record: LinkRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_url
            .entry(record.url.clone())
            .or_default()
            .insert(seq, record.slug.clone());
        self.by_slug.insert(record.slug.clone(), Entry { seq, record });
    }

    fn replace(&mut self, link: NewLink) {
        let Some(entry) = self.by_slug.get_mut(&link.slug) else {
            self.insert(link.into_record());
            return;
        };

        let old_url = std::mem::replace(&mut entry.record.url, link.url.as_str().to_string());
        entry.record.origin = link.origin;
        entry.record.created_at = link.created_at;
        let seq = entry.seq;

        if let Some(slugs) = self.by_url.get_mut(&old_url) {
            slugs.remove(&seq);
            if slugs.is_empty() {
                self.by_url.remove(&old_url);
            }
        }
        self.by_url
            .entry(link.url.as_str().to_string())
            .or_default()
            .insert(seq, link.slug);
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<LinkRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.by_slug.get(slug).map(|e| e.record.clone()))
    }

    async fn find_by_url(&self, url: &NormalizedUrl) -> Result<Option<LinkRecord>> {
        let inner = self.inner.read().await;
        let Some(slugs) = inner.by_url.get(url.as_str()) else {
            return Ok(None);
        };
        let Some((_, slug)) = slugs.iter().next() else {
            return Ok(None);
        };
        let entry = inner.by_slug.get(slug).ok_or_else(|| {
            ShortlinkError::Internal(format!("url index points at missing slug '{}'", slug))
        })?;
        Ok(Some(entry.record.clone()))
    }

    async fn upsert(&self, link: NewLink, mode: UpsertMode) -> Result<()> {
        let mut inner = self.inner.write().await;
        match mode {
            UpsertMode::InsertOnly => {
                if inner.by_slug.contains_key(&link.slug) {
                    return Err(ShortlinkError::SlugConflict(link.slug.into_string()));
                }
                inner.insert(link.into_record());
            }
            UpsertMode::Overwrite => inner.replace(link),
        }
        Ok(())
    }

    async fn recent_custom(&self, limit: usize) -> Result<Vec<LinkRecord>> {
        let inner = self.inner.read().await;
        let mut custom: Vec<&Entry> = inner
            .by_slug
            .values()
            .filter(|e| e.record.status == LinkStatus::Custom)
            .collect();
        custom.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(custom
            .into_iter()
            .take(limit.min(MAX_LISTING))
            .map(|e| e.record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Origin;
    use crate::normalize::normalize;

    fn link(slug: &str, url: &str, status: LinkStatus) -> NewLink {
        NewLink::new(
            Slug::from_trusted(slug),
            normalize(url).unwrap(),
            Origin::default(),
            status,
        )
    }

    #[tokio::test]
    async fn insert_only_rejects_existing_slug() {
        let store = MemoryStore::new();
        store
            .upsert(link("abcd", "https://a.example/", LinkStatus::Generated), UpsertMode::InsertOnly)
            .await
            .unwrap();

        let err = store
            .upsert(link("abcd", "https://b.example/", LinkStatus::Generated), UpsertMode::InsertOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, ShortlinkError::SlugConflict(ref s) if s == "abcd"));

        let record = store.find_by_slug(&Slug::from_trusted("abcd")).await.unwrap().unwrap();
        assert_eq!(record.url, "https://a.example/");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn overwrite_moves_url_index() {
        let store = MemoryStore::new();
        store
            .upsert(link("mine", "https://a.example/", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap();
        store
            .upsert(link("mine", "https://b.example/", LinkStatus::Generated), UpsertMode::Overwrite)
            .await
            .unwrap();

        let a = normalize("https://a.example/").unwrap();
        let b = normalize("https://b.example/").unwrap();
        assert!(store.find_by_url(&a).await.unwrap().is_none());

        let record = store.find_by_url(&b).await.unwrap().unwrap();
        assert_eq!(record.slug.as_str(), "mine");
        // status survives an overwrite
        assert_eq!(record.status, LinkStatus::Custom);
    }

    #[tokio::test]
    async fn overwrite_creates_missing_slug() {
        let store = MemoryStore::new();
        store
            .upsert(link("new1", "https://a.example/", LinkStatus::Custom), UpsertMode::Overwrite)
            .await
            .unwrap();
        assert!(store.find_by_slug(&Slug::from_trusted("new1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn find_by_url_returns_first_inserted() {
        let store = MemoryStore::new();
        store
            .upsert(link("first", "https://a.example/", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap();
        store
            .upsert(link("second", "https://a.example/", LinkStatus::Custom), UpsertMode::InsertOnly)
            .await
            .unwrap();

        let url = normalize("https://a.example/").unwrap();
        let record = store.find_by_url(&url).await.unwrap().unwrap();
        assert_eq!(record.slug.as_str(), "first");
    }

    #[tokio::test]
    async fn recent_custom_is_newest_first_and_capped() {
        let store = MemoryStore::new();
        for i in 0..(MAX_LISTING + 5) {
            let status = if i % 2 == 0 { LinkStatus::Custom } else { LinkStatus::Generated };
            store
                .upsert(
                    link(&format!("s{}", i), &format!("https://example.com/{}", i), status),
                    UpsertMode::InsertOnly,
                )
                .await
                .unwrap();
        }

        let recent = store.recent_custom(3).await.unwrap();
        let slugs: Vec<&str> = recent.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["s104", "s102", "s100"]);

        let all = store.recent_custom(usize::MAX).await.unwrap();
        assert_eq!(all.len(), 53);
        assert!(all.iter().all(|r| r.status == LinkStatus::Custom));
    }
}
