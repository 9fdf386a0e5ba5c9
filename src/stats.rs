//! Catalog statistics.
//!
//! Row counts for the five catalog tables, used by `bundle-search stats` to
//! confirm that loads are landing where expected.

use anyhow::Result;

use bundle_search_core::models::CatalogCounts;
use bundle_search_core::store::CatalogStore;

use crate::config::Config;
use crate::db;
use crate::pg_store::PgCatalog;

/// Format counts the way the `stats` command prints them.
pub fn format_counts(config: &Config, counts: &CatalogCounts) -> String {
    let mut out = String::new();
    out.push_str("Bundle Search — Catalog Stats\n");
    out.push_str("=============================\n\n");
    out.push_str(&format!(
        "  Database:        {}@{}:{}/{}\n\n",
        config.db.user, config.db.host, config.db.port, config.db.database
    ));
    out.push_str(&format!("  Bundles:         {}\n", counts.bundles));
    out.push_str(&format!("  Items:           {}\n", counts.items));
    out.push_str(&format!("  Charities:       {}\n", counts.charities));
    out.push_str(&format!("  Bundle items:    {}\n", counts.bundle_items));
    out.push_str(&format!("  Charity bundles: {}\n", counts.charity_bundles));
    out
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    let store = PgCatalog::new(pool);
    let counts = store.counts().await?;

    print!("{}", format_counts(config, &counts));

    store.pool().close().await;
    Ok(())
}
