//! Catalog data models.
//!
//! These types mirror the five catalog tables: `bundle`, `item`, `charity`,
//! and the `bundle_item` / `charity_bundle` join tables. Items and charities
//! share one shape ([`Entry`]) and are told apart by [`EntryKind`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensionality of every `description_embedding` column.
pub const VECTOR_DIMENSION: usize = 768;

/// A time-boxed promotional offering of digital products.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// Stable, globally unique key; the idempotency key for ingestion.
    pub machine_name: String,
    pub author: String,
    pub human_name: String,
    /// HTML description, rendered as-is by the front end.
    pub description: String,
    pub detailed_marketing_blurb: String,
    pub short_marketing_blurb: String,
    /// `ebook`, `game` or `software` in practice, stored verbatim.
    pub media_type: String,
    /// Short tile name.
    pub name: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    /// Path relative to the storefront base URL.
    pub url: String,
    pub description_embedding: Vec<f32>,
}

/// Which entity table an [`Entry`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Item,
    Charity,
}

impl EntryKind {
    pub fn table(self) -> &'static str {
        match self {
            EntryKind::Item => "item",
            EntryKind::Charity => "charity",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// An item or charity row. Both are shared across bundles.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub kind: EntryKind,
    pub machine_name: String,
    pub human_name: String,
    pub description: String,
    pub description_embedding: Vec<f32>,
}

/// Media-type filter applied to bundle searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Ebook,
    Game,
    Software,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Ebook => "ebook",
            MediaType::Game => "game",
            MediaType::Software => "software",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row returned by a bundle similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct BundleHit {
    pub machine_name: String,
    pub author: String,
    pub human_name: String,
    pub description: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub media_type: String,
    pub url: String,
    /// L2 distance between the bundle and the query embedding.
    pub distance: f64,
}

/// Row counts for the five catalog tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub bundles: i64,
    pub items: i64,
    pub charities: i64,
    pub bundle_items: i64,
    pub charity_bundles: i64,
}
