//! Postgres + pgvector backed [`CatalogStore`] implementation.
//!
//! Embeddings are bound as pgvector text literals and cast with
//! `::vector`. Every insert is a single autocommitted
//! `INSERT ... ON CONFLICT DO NOTHING`, so completed rows persist even if a
//! later statement fails and concurrent loaders cannot create duplicates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use bundle_search_core::embedding::vector_literal;
use bundle_search_core::models::{Bundle, BundleHit, CatalogCounts, Entry, EntryKind};
use bundle_search_core::query::BundleQuery;
use bundle_search_core::store::CatalogStore;

/// Postgres implementation of the [`CatalogStore`] trait.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn has_bundle(&self, machine_name: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM bundle WHERE machine_name = $1")
            .bind(machine_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn has_entry(&self, kind: EntryKind, machine_name: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {} WHERE machine_name = $1",
            kind.table()
        ))
        .bind(machine_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn insert_bundle(&self, bundle: &Bundle) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO bundle (machine_name, author, human_name, description,
                                detailed_marketing_blurb, short_marketing_blurb,
                                media_type, name, start_date, end_date, url,
                                description_embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::vector)
            ON CONFLICT (machine_name) DO NOTHING
            "#,
        )
        .bind(&bundle.machine_name)
        .bind(&bundle.author)
        .bind(&bundle.human_name)
        .bind(&bundle.description)
        .bind(&bundle.detailed_marketing_blurb)
        .bind(&bundle.short_marketing_blurb)
        .bind(&bundle.media_type)
        .bind(&bundle.name)
        .bind(bundle.start_date)
        .bind(bundle.end_date)
        .bind(&bundle.url)
        .bind(vector_literal(&bundle.description_embedding))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert bundle {}", bundle.machine_name))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_entry(&self, entry: &Entry) -> Result<bool> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (machine_name, human_name, description, description_embedding)
            VALUES ($1, $2, $3, $4::vector)
            ON CONFLICT (machine_name) DO NOTHING
            "#,
            entry.kind.table()
        ))
        .bind(&entry.machine_name)
        .bind(&entry.human_name)
        .bind(&entry.description)
        .bind(vector_literal(&entry.description_embedding))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert {} {}", entry.kind, entry.machine_name))?;

        Ok(result.rows_affected() == 1)
    }

    async fn link_item(&self, bundle_id: &str, item_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO bundle_item (bundle_id, item_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(bundle_id)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn link_charity(&self, charity_id: &str, bundle_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO charity_bundle (charity_id, bundle_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(charity_id)
        .bind(bundle_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn search_bundles(&self, query: &BundleQuery) -> Result<Vec<BundleHit>> {
        let sql = query.to_sql();
        let mut q = sqlx::query(&sql).bind(query.vector_param());
        if let Some(media) = query.media_type() {
            q = q.bind(media.as_str());
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .context("Bundle similarity query failed")?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            hits.push(BundleHit {
                machine_name: row.try_get("machine_name")?,
                author: row
                    .try_get::<Option<String>, _>("author")?
                    .unwrap_or_default(),
                human_name: row
                    .try_get::<Option<String>, _>("human_name")?
                    .unwrap_or_default(),
                description: row
                    .try_get::<Option<String>, _>("description")?
                    .unwrap_or_default(),
                start_date: row.try_get("start_date")?,
                end_date: row.try_get("end_date")?,
                media_type: row
                    .try_get::<Option<String>, _>("media_type")?
                    .unwrap_or_default(),
                url: row.try_get::<Option<String>, _>("url")?.unwrap_or_default(),
                distance: row.try_get("distance")?,
            });
        }
        Ok(hits)
    }

    async fn counts(&self) -> Result<CatalogCounts> {
        Ok(CatalogCounts {
            bundles: self.count("bundle").await?,
            items: self.count("item").await?,
            charities: self.count("charity").await?,
            bundle_items: self.count("bundle_item").await?,
            charity_bundles: self.count("charity_bundle").await?,
        })
    }
}
