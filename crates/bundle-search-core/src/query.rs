//! Similarity query builder for bundle searches.
//!
//! A [`BundleQuery`] is a structured plan: the query embedding, a list of
//! [`Filter`]s and a row limit. [`BundleQuery::to_sql`] renders it as a
//! parameterized Postgres statement; the in-memory store evaluates the same
//! filters directly.
//!
//! # Rendered shape
//!
//! ```text
//! SELECT machine_name, ..., description_embedding <-> $1::vector AS distance
//! FROM bundle
//! WHERE description_embedding <-> $1::vector < 3
//!     AND media_type = $2        -- only with a media filter
//!     AND now() < end_date       -- only for "current" intents
//! ORDER BY
//!     description_embedding <-> $1::vector
//! LIMIT 10
//! ```
//!
//! `$1` is the pgvector text literal of the query embedding, `$2` the media
//! type. The threshold is a candidate filter, not a relevance cutoff.

use anyhow::{bail, Result};

use crate::embedding::vector_literal;
use crate::intent::{Intent, IntentTarget};
use crate::models::MediaType;

/// Default maximum `<->` distance for a candidate.
pub const DISTANCE_THRESHOLD: f64 = 3.0;

/// Default number of rows returned.
pub const RESULT_LIMIT: i64 = 10;

/// Columns selected for each bundle hit, in result order.
pub const BUNDLE_FIELDS: [&str; 8] = [
    "machine_name",
    "author",
    "human_name",
    "description",
    "start_date",
    "end_date",
    "media_type",
    "url",
];

const DISTANCE_EXPR: &str = "description_embedding <-> $1::vector";

/// Tuning knobs for the builder, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    pub distance_threshold: f64,
    pub limit: i64,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            distance_threshold: DISTANCE_THRESHOLD,
            limit: RESULT_LIMIT,
        }
    }
}

/// A single `WHERE` condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// `distance < threshold`.
    Distance { threshold: f64 },
    /// `media_type = $2`.
    MediaType(MediaType),
    /// `now() < end_date`.
    Current,
}

/// A planned bundle similarity search.
#[derive(Debug, Clone)]
pub struct BundleQuery {
    pub embedding: Vec<f32>,
    pub filters: Vec<Filter>,
    pub limit: i64,
}

impl BundleQuery {
    /// Plan a search for a `bundle` intent.
    ///
    /// Fails for `charity` and `item` intents, which have no query.
    pub fn build(intent: &Intent, embedding: Vec<f32>, params: &QueryParams) -> Result<Self> {
        if intent.target != IntentTarget::Bundle {
            bail!("no bundle query for {:?} intent", intent.target);
        }

        let mut filters = vec![Filter::Distance {
            threshold: params.distance_threshold,
        }];
        if let Some(media) = intent.media_type {
            filters.push(Filter::MediaType(media));
        }
        if intent.current {
            filters.push(Filter::Current);
        }

        Ok(Self {
            embedding,
            filters,
            limit: params.limit,
        })
    }

    /// The distance expression shared by the filter, projection and ordering.
    pub fn distance_expr() -> &'static str {
        DISTANCE_EXPR
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.filters.iter().find_map(|f| match f {
            Filter::MediaType(m) => Some(*m),
            _ => None,
        })
    }

    pub fn threshold(&self) -> Option<f64> {
        self.filters.iter().find_map(|f| match f {
            Filter::Distance { threshold } => Some(*threshold),
            _ => None,
        })
    }

    pub fn current_only(&self) -> bool {
        self.filters.contains(&Filter::Current)
    }

    /// Rendered `WHERE` conditions, in filter order.
    pub fn conditions(&self) -> Vec<String> {
        self.filters
            .iter()
            .map(|f| match f {
                Filter::Distance { threshold } => format!("{} < {}", DISTANCE_EXPR, threshold),
                Filter::MediaType(_) => "media_type = $2".to_string(),
                Filter::Current => "now() < end_date".to_string(),
            })
            .collect()
    }

    /// Render the parameterized SQL statement.
    pub fn to_sql(&self) -> String {
        let sep = "\n    ";
        let mut fields: Vec<String> = BUNDLE_FIELDS.iter().map(|f| f.to_string()).collect();
        fields.push(format!("{} AS distance", DISTANCE_EXPR));

        format!(
            "SELECT {fields}\nFROM bundle\nWHERE {conditions}\nORDER BY{sep}{order}\nLIMIT {limit}",
            fields = fields.join(&format!(",{}", sep)),
            conditions = self.conditions().join(&format!("{}AND ", sep)),
            sep = sep,
            order = DISTANCE_EXPR,
            limit = self.limit,
        )
    }

    /// `$1` as bound: the pgvector literal of the query embedding.
    pub fn vector_param(&self) -> String {
        vector_literal(&self.embedding)
    }

    /// Human-readable parameter bindings for the debug panel.
    pub fn describe_params(&self) -> Vec<String> {
        let mut params = vec![format!("$1 = vector({})", self.embedding.len())];
        if let Some(media) = self.media_type() {
            params.push(format!("$2 = '{}'", media));
        }
        params
    }
}
