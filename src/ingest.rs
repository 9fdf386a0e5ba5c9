//! Ingestion pipeline.
//!
//! Loads `bundles-*.jsonl` files into the catalog. For every record:
//!
//! 1. each charity in `charity_data.charity_items` is created if absent,
//! 2. each item in `tier_item_data` is created if absent,
//! 3. the bundle itself is created if absent,
//! 4. the `charity_bundle` and `bundle_item` rows are created if absent.
//!
//! Existing rows are never updated, so re-running over the same or extended
//! files is safe. Embeddings are computed only for rows that do not exist
//! yet, through the [`VectorCache`]; the cache file is written once, after
//! the last record. Any error aborts the run; rows inserted before it stay
//! committed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use bundle_search_core::embedding::Embedder;
use bundle_search_core::models::EntryKind;
use bundle_search_core::store::CatalogStore;

use crate::cache::VectorCache;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::pg_store::PgCatalog;
use crate::source::{discover_files, BundleRecord, EntryRecord, RecordReader};

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files: u64,
    pub records: u64,
    pub bundles_created: u64,
    pub bundles_existing: u64,
    pub items_created: u64,
    pub items_existing: u64,
    pub charities_created: u64,
    pub charities_existing: u64,
    pub item_links_created: u64,
    pub charity_links_created: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// The pipeline's collaborators, created once by the caller.
pub struct Ingestor<'a> {
    store: &'a dyn CatalogStore,
    embedder: &'a dyn Embedder,
    cache: &'a mut VectorCache,
    report: IngestReport,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        embedder: &'a dyn Embedder,
        cache: &'a mut VectorCache,
    ) -> Self {
        Self {
            store,
            embedder,
            cache,
            report: IngestReport::default(),
        }
    }

    /// Ingest every record of every file, stopping after `limit` records.
    ///
    /// Does not save the cache; call [`Ingestor::finish`] once this returns
    /// successfully.
    pub async fn ingest_files(&mut self, files: &[PathBuf], limit: Option<usize>) -> Result<()> {
        for file in files {
            if limit.is_some_and(|lim| self.report.records as usize >= lim) {
                break;
            }
            info!(file = %file.display(), "loading source file");
            self.report.files += 1;

            for next in RecordReader::open(file)? {
                if limit.is_some_and(|lim| self.report.records as usize >= lim) {
                    break;
                }
                let (line_no, record) = next?;
                self.ingest_record(&record)
                    .await
                    .with_context(|| format!("{}:{}", file.display(), line_no))?;
            }
        }
        Ok(())
    }

    /// Ingest one bundle record.
    pub async fn ingest_record(&mut self, record: &BundleRecord) -> Result<()> {
        // Fail on bad dates before spending any embedding work.
        let dates = record.dates()?;

        for (machine_name, charity) in record.charities() {
            self.ensure_entry(EntryKind::Charity, machine_name, charity)
                .await?;
        }

        for (machine_name, item) in record.items() {
            self.ensure_entry(EntryKind::Item, machine_name, item).await?;
        }

        let bundle_id = record.machine_name.as_str();
        if self.store.has_bundle(bundle_id).await? {
            debug!(bundle = bundle_id, "bundle exists, skipping");
            self.report.bundles_existing += 1;
        } else {
            info!(bundle = bundle_id, "bundle not found, creating");
            let embedding = self
                .cache
                .get_or_embed(bundle_id, &record.basic_data.description, self.embedder)
                .await?;
            let bundle = record.to_bundle(dates, embedding);
            if self.store.insert_bundle(&bundle).await? {
                self.report.bundles_created += 1;
            } else {
                self.report.bundles_existing += 1;
            }
        }

        for charity_id in record.charities().keys() {
            if self.store.link_charity(charity_id, bundle_id).await? {
                self.report.charity_links_created += 1;
            }
        }

        for item_id in record.items().keys() {
            if self.store.link_item(bundle_id, item_id).await? {
                self.report.item_links_created += 1;
            }
        }

        self.report.records += 1;
        Ok(())
    }

    async fn ensure_entry(
        &mut self,
        kind: EntryKind,
        machine_name: &str,
        record: &EntryRecord,
    ) -> Result<()> {
        if self.store.has_entry(kind, machine_name).await? {
            self.count_entry(kind, false);
            return Ok(());
        }

        info!(%kind, machine_name, "not found, creating");
        let embedding = self
            .cache
            .get_or_embed(machine_name, &record.description_text, self.embedder)
            .await?;
        let entry = record.to_entry(kind, machine_name, embedding);
        let created = self.store.insert_entry(&entry).await?;
        self.count_entry(kind, created);
        Ok(())
    }

    fn count_entry(&mut self, kind: EntryKind, created: bool) {
        let counter = match (kind, created) {
            (EntryKind::Item, true) => &mut self.report.items_created,
            (EntryKind::Item, false) => &mut self.report.items_existing,
            (EntryKind::Charity, true) => &mut self.report.charities_created,
            (EntryKind::Charity, false) => &mut self.report.charities_existing,
        };
        *counter += 1;
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    /// Write the cache file and return the final report.
    pub fn finish(mut self) -> Result<IngestReport> {
        self.cache.save()?;
        self.report.cache_hits = self.cache.hits();
        self.report.cache_misses = self.cache.misses();
        Ok(self.report)
    }
}

/// Counts gathered by a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DryRunReport {
    pub files: u64,
    pub records: u64,
    pub distinct_items: usize,
    pub distinct_charities: usize,
}

/// Parse every file without touching the store, provider or cache.
pub fn dry_run(files: &[PathBuf], limit: Option<usize>) -> Result<DryRunReport> {
    let mut report = DryRunReport::default();
    let mut items = BTreeSet::new();
    let mut charities = BTreeSet::new();

    for file in files {
        if limit.is_some_and(|lim| report.records as usize >= lim) {
            break;
        }
        report.files += 1;
        for next in RecordReader::open(file)? {
            if limit.is_some_and(|lim| report.records as usize >= lim) {
                break;
            }
            let (_, record) = next?;
            record.dates()?;
            items.extend(record.items().keys().cloned());
            charities.extend(record.charities().keys().cloned());
            report.records += 1;
        }
    }

    report.distinct_items = items.len();
    report.distinct_charities = charities.len();
    Ok(report)
}

/// CLI entry point for `bundle-search load`.
pub async fn run_load(
    config: &Config,
    data_dir: Option<&Path>,
    dry: bool,
    limit: Option<usize>,
) -> Result<()> {
    let data_dir = data_dir.unwrap_or(&config.ingest.data_dir);
    let files = discover_files(data_dir, &config.ingest.file_glob)?;

    if dry {
        let report = dry_run(&files, limit)?;
        println!("load (dry-run)");
        println!("  files: {}", report.files);
        println!("  records: {}", report.records);
        println!("  distinct items: {}", report.distinct_items);
        println!("  distinct charities: {}", report.distinct_charities);
        return Ok(());
    }

    let pool = db::connect(&config.db).await?;
    migrate::migrate(&pool, config.embedding.dims).await?;
    let store = PgCatalog::new(pool);
    let embedder = create_embedder(&config.embedding).await?;
    let mut cache = VectorCache::load(&config.ingest.cache_path)?;

    let mut ingestor = Ingestor::new(&store, embedder.as_ref(), &mut cache);
    ingestor.ingest_files(&files, limit).await?;
    let report = ingestor.finish()?;

    println!("load {}", data_dir.display());
    println!("  files: {}", report.files);
    println!("  records: {}", report.records);
    println!(
        "  bundles created: {} (existing: {})",
        report.bundles_created, report.bundles_existing
    );
    println!(
        "  items created: {} (existing: {})",
        report.items_created, report.items_existing
    );
    println!(
        "  charities created: {} (existing: {})",
        report.charities_created, report.charities_existing
    );
    println!("  bundle-item links created: {}", report.item_links_created);
    println!(
        "  charity-bundle links created: {}",
        report.charity_links_created
    );
    println!(
        "  embeddings: {} computed, {} from cache",
        report.cache_misses, report.cache_hits
    );
    println!("  cache: {}", config.ingest.cache_path.display());
    println!("ok");

    store.pool().close().await;
    Ok(())
}
