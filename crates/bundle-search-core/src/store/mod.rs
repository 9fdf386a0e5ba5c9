//! Storage abstraction for the catalog.
//!
//! The [`CatalogStore`] trait covers everything ingestion and search need
//! from the database: existence checks, insert-if-absent for the three
//! entity tables and the two join tables, the bundle similarity search, and
//! row counts.
//!
//! Every `insert_*`/`link_*` method is insert-if-absent: it never updates an
//! existing row and returns `true` only when a new row was written.
//! Implementations must make that atomic (e.g. `ON CONFLICT DO NOTHING`).

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Bundle, BundleHit, CatalogCounts, Entry, EntryKind};
use crate::query::BundleQuery;

/// Abstract catalog backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`has_bundle`](CatalogStore::has_bundle) | Bundle exists by machine name |
/// | [`has_entry`](CatalogStore::has_entry) | Item/charity exists by machine name |
/// | [`insert_bundle`](CatalogStore::insert_bundle) | Insert a bundle if absent |
/// | [`insert_entry`](CatalogStore::insert_entry) | Insert an item/charity if absent |
/// | [`link_item`](CatalogStore::link_item) | Insert a `bundle_item` row if absent |
/// | [`link_charity`](CatalogStore::link_charity) | Insert a `charity_bundle` row if absent |
/// | [`search_bundles`](CatalogStore::search_bundles) | Run a planned similarity search |
/// | [`counts`](CatalogStore::counts) | Row counts for all five tables |
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn has_bundle(&self, machine_name: &str) -> Result<bool>;

    async fn has_entry(&self, kind: EntryKind, machine_name: &str) -> Result<bool>;

    async fn insert_bundle(&self, bundle: &Bundle) -> Result<bool>;

    async fn insert_entry(&self, entry: &Entry) -> Result<bool>;

    async fn link_item(&self, bundle_id: &str, item_id: &str) -> Result<bool>;

    async fn link_charity(&self, charity_id: &str, bundle_id: &str) -> Result<bool>;

    /// Execute a planned bundle search: filtered, nearest first, limited.
    async fn search_bundles(&self, query: &BundleQuery) -> Result<Vec<BundleHit>>;

    async fn counts(&self) -> Result<CatalogCounts>;
}
