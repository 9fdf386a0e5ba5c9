use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Create the pgvector extension, the five catalog tables and the vector
/// indexes. Every statement is idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate(&pool, config.embedding.dims).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate(pool: &PgPool, dims: usize) -> Result<()> {
    info!("creating extension");
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    info!("creating bundle table");
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS bundle (
            machine_name VARCHAR(255) PRIMARY KEY,
            author VARCHAR(255),
            human_name VARCHAR(255),
            description TEXT,
            detailed_marketing_blurb TEXT,
            short_marketing_blurb TEXT,
            media_type VARCHAR(255),
            name VARCHAR(255),
            start_date TIMESTAMP,
            end_date TIMESTAMP,
            url VARCHAR(255),
            description_embedding vector({dims})
        )
        "#
    ))
    .execute(pool)
    .await?;

    // item and charity share a shape
    for table in ["item", "charity"] {
        info!("creating {} table", table);
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                machine_name VARCHAR(255) PRIMARY KEY,
                human_name VARCHAR(255),
                description TEXT,
                description_embedding vector({dims})
            )
            "#
        ))
        .execute(pool)
        .await?;
    }

    info!("creating bundle_item table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bundle_item (
            bundle_id VARCHAR(255),
            item_id VARCHAR(255),
            PRIMARY KEY (bundle_id, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("creating charity_bundle table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS charity_bundle (
            charity_id VARCHAR(255),
            bundle_id VARCHAR(255),
            PRIMARY KEY (charity_id, bundle_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for table in ["bundle", "item", "charity"] {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_embedding ON {table} \
             USING hnsw (description_embedding vector_l2_ops)"
        ))
        .execute(pool)
        .await?;
    }
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bundle_end_date ON bundle(end_date)")
        .execute(pool)
        .await?;

    Ok(())
}
