//! In-memory [`CatalogStore`] implementation for testing.
//!
//! Uses `BTreeMap`/`BTreeSet` behind `std::sync::RwLock`. Bundle search is a
//! brute-force L2 scan that applies the same [`Filter`]s the SQL store
//! renders, so query plans can be exercised without a database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use crate::embedding::l2_distance;
use crate::models::{Bundle, BundleHit, CatalogCounts, Entry, EntryKind};
use crate::query::{BundleQuery, Filter};

use super::CatalogStore;

/// In-memory catalog.
pub struct InMemoryCatalog {
    bundles: RwLock<BTreeMap<String, Bundle>>,
    items: RwLock<BTreeMap<String, Entry>>,
    charities: RwLock<BTreeMap<String, Entry>>,
    bundle_items: RwLock<BTreeSet<(String, String)>>,
    charity_bundles: RwLock<BTreeSet<(String, String)>>,
    searches: AtomicUsize,
    now: Option<NaiveDateTime>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            bundles: RwLock::new(BTreeMap::new()),
            items: RwLock::new(BTreeMap::new()),
            charities: RwLock::new(BTreeMap::new()),
            bundle_items: RwLock::new(BTreeSet::new()),
            charity_bundles: RwLock::new(BTreeSet::new()),
            searches: AtomicUsize::new(0),
            now: None,
        }
    }

    /// Pin the clock used by the `current` filter.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Number of times [`CatalogStore::search_bundles`] has been called.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn bundle(&self, machine_name: &str) -> Option<Bundle> {
        self.bundles.read().unwrap().get(machine_name).cloned()
    }

    pub fn entry(&self, kind: EntryKind, machine_name: &str) -> Option<Entry> {
        self.entries(kind).read().unwrap().get(machine_name).cloned()
    }

    fn entries(&self, kind: EntryKind) -> &RwLock<BTreeMap<String, Entry>> {
        match kind {
            EntryKind::Item => &self.items,
            EntryKind::Charity => &self.charities,
        }
    }

    fn matches(&self, bundle: &Bundle, distance: f64, query: &BundleQuery) -> bool {
        let now = self.now.unwrap_or_else(|| Utc::now().naive_utc());
        query.filters.iter().all(|f| match f {
            Filter::Distance { threshold } => distance < *threshold,
            Filter::MediaType(media) => bundle.media_type == media.as_str(),
            Filter::Current => now < bundle.end_date,
        })
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn has_bundle(&self, machine_name: &str) -> Result<bool> {
        Ok(self.bundles.read().unwrap().contains_key(machine_name))
    }

    async fn has_entry(&self, kind: EntryKind, machine_name: &str) -> Result<bool> {
        Ok(self.entries(kind).read().unwrap().contains_key(machine_name))
    }

    async fn insert_bundle(&self, bundle: &Bundle) -> Result<bool> {
        let mut bundles = self.bundles.write().unwrap();
        if bundles.contains_key(&bundle.machine_name) {
            return Ok(false);
        }
        bundles.insert(bundle.machine_name.clone(), bundle.clone());
        Ok(true)
    }

    async fn insert_entry(&self, entry: &Entry) -> Result<bool> {
        let mut entries = self.entries(entry.kind).write().unwrap();
        if entries.contains_key(&entry.machine_name) {
            return Ok(false);
        }
        entries.insert(entry.machine_name.clone(), entry.clone());
        Ok(true)
    }

    async fn link_item(&self, bundle_id: &str, item_id: &str) -> Result<bool> {
        Ok(self
            .bundle_items
            .write()
            .unwrap()
            .insert((bundle_id.to_string(), item_id.to_string())))
    }

    async fn link_charity(&self, charity_id: &str, bundle_id: &str) -> Result<bool> {
        Ok(self
            .charity_bundles
            .write()
            .unwrap()
            .insert((charity_id.to_string(), bundle_id.to_string())))
    }

    async fn search_bundles(&self, query: &BundleQuery) -> Result<Vec<BundleHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let bundles = self.bundles.read().unwrap();
        let mut hits: Vec<BundleHit> = bundles
            .values()
            .filter_map(|b| {
                let distance = l2_distance(&b.description_embedding, &query.embedding);
                if !self.matches(b, distance, query) {
                    return None;
                }
                Some(BundleHit {
                    machine_name: b.machine_name.clone(),
                    author: b.author.clone(),
                    human_name: b.human_name.clone(),
                    description: b.description.clone(),
                    start_date: b.start_date,
                    end_date: b.end_date,
                    media_type: b.media_type.clone(),
                    url: b.url.clone(),
                    distance,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.limit.max(0) as usize);
        Ok(hits)
    }

    async fn counts(&self) -> Result<CatalogCounts> {
        Ok(CatalogCounts {
            bundles: self.bundles.read().unwrap().len() as i64,
            items: self.items.read().unwrap().len() as i64,
            charities: self.charities.read().unwrap().len() as i64,
            bundle_items: self.bundle_items.read().unwrap().len() as i64,
            charity_bundles: self.charity_bundles.read().unwrap().len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, IntentTarget};
    use crate::models::MediaType;
    use crate::query::QueryParams;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bundle(name: &str, media: &str, end: NaiveDateTime, emb: Vec<f32>) -> Bundle {
        Bundle {
            machine_name: name.to_string(),
            author: "Publisher".to_string(),
            human_name: name.to_uppercase(),
            description: "<p>desc</p>".to_string(),
            detailed_marketing_blurb: String::new(),
            short_marketing_blurb: String::new(),
            media_type: media.to_string(),
            name: name.to_string(),
            start_date: ts(2024, 1, 1),
            end_date: end,
            url: format!("/{}", name),
            description_embedding: emb,
        }
    }

    fn query(media_type: Option<MediaType>, current: bool, emb: Vec<f32>) -> BundleQuery {
        let intent = Intent {
            target: IntentTarget::Bundle,
            query: "q".to_string(),
            media_type,
            current,
        };
        BundleQuery::build(&intent, emb, &QueryParams::default()).unwrap()
    }

    async fn seeded() -> InMemoryCatalog {
        let store = InMemoryCatalog::new().with_now(ts(2025, 6, 1));
        store
            .insert_bundle(&bundle("near-game", "game", ts(2025, 7, 1), vec![0.1, 0.0]))
            .await
            .unwrap();
        store
            .insert_bundle(&bundle("mid-book", "ebook", ts(2025, 1, 1), vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_bundle(&bundle("far-away", "game", ts(2026, 1, 1), vec![10.0, 0.0]))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_orders_nearest_first_within_threshold() {
        let store = seeded().await;
        let hits = store
            .search_bundles(&query(None, false, vec![0.0, 0.0]))
            .await
            .unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.machine_name.as_str()).collect();
        assert_eq!(names, vec!["near-game", "mid-book"]);
        assert_eq!(store.search_count(), 1);
    }

    #[tokio::test]
    async fn test_search_media_and_current_filters() {
        let store = seeded().await;
        let books = store
            .search_bundles(&query(Some(MediaType::Ebook), false, vec![0.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].machine_name, "mid-book");

        let current = store
            .search_bundles(&query(None, true, vec![0.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].machine_name, "near-game");
    }

    #[tokio::test]
    async fn test_insert_if_absent() {
        let store = InMemoryCatalog::new();
        let b = bundle("b", "game", ts(2025, 1, 1), vec![0.0]);
        assert!(store.insert_bundle(&b).await.unwrap());
        assert!(!store.insert_bundle(&b).await.unwrap());
        assert!(store.link_item("b", "i").await.unwrap());
        assert!(!store.link_item("b", "i").await.unwrap());
        assert!(store.link_charity("c", "b").await.unwrap());
        assert!(!store.link_charity("c", "b").await.unwrap());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.bundles, 1);
        assert_eq!(counts.bundle_items, 1);
        assert_eq!(counts.charity_bundles, 1);
    }
}
