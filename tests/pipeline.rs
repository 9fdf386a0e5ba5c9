//! Ingestion pipeline against the in-memory catalog and a counting embedder.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use bundle_search::cache::VectorCache;
use bundle_search::ingest::Ingestor;
use bundle_search::testing::CountingEmbedder;
use bundle_search_core::models::{CatalogCounts, EntryKind};
use bundle_search_core::store::memory::InMemoryCatalog;
use bundle_search_core::store::CatalogStore;

const DIMS: usize = 8;

fn record(machine_name: &str, items: &[&str], charities: &[&str]) -> String {
    let items: serde_json::Map<String, serde_json::Value> = items
        .iter()
        .map(|i| {
            (
                i.to_string(),
                serde_json::json!({"human_name": i.to_uppercase(), "description_text": format!("about {}", i)}),
            )
        })
        .collect();
    let charities: serde_json::Map<String, serde_json::Value> = charities
        .iter()
        .map(|c| {
            (
                c.to_string(),
                serde_json::json!({"human_name": c.to_uppercase(), "description_text": format!("charity {}", c)}),
            )
        })
        .collect();

    serde_json::json!({
        "machine_name": machine_name,
        "author": "Publisher",
        "basic_data": {
            "human_name": format!("{} bundle", machine_name),
            "description": format!("<p>{} description</p>", machine_name),
            "detailed_marketing_blurb": "detailed",
            "short_marketing_blurb": "short",
            "media_type": "ebook"
        },
        "from_bundle": {
            "tile_short_name": machine_name,
            "start_date|datetime": "2024-03-01T18:00:00",
            "end_date|datetime": "2024-03-21T18:00:00",
            "product_url": format!("/books/{}", machine_name)
        },
        "charity_data": {"charity_items": charities},
        "tier_item_data": items
    })
    .to_string()
}

fn write_file(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

async fn load(
    store: &InMemoryCatalog,
    embedder: &CountingEmbedder,
    cache_path: &Path,
    files: &[PathBuf],
) -> bundle_search::ingest::IngestReport {
    let mut cache = VectorCache::load(cache_path).unwrap();
    let mut ingestor = Ingestor::new(store, embedder, &mut cache);
    ingestor.ingest_files(files, None).await.unwrap();
    ingestor.finish().unwrap()
}

#[tokio::test]
async fn test_one_record_one_row_per_table() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(
        tmp.path(),
        "bundles-1.jsonl",
        &[record("b1", &["i1"], &["c1"])],
    );
    let store = InMemoryCatalog::new();
    let embedder = CountingEmbedder::new(DIMS);

    let report = load(&store, &embedder, &tmp.path().join("cache.json"), &[file]).await;

    assert_eq!(
        store.counts().await.unwrap(),
        CatalogCounts {
            bundles: 1,
            items: 1,
            charities: 1,
            bundle_items: 1,
            charity_bundles: 1,
        }
    );
    assert_eq!(report.bundles_created, 1);
    assert_eq!(report.cache_misses, 3);
    assert_eq!(embedder.calls(), 3);

    let bundle = store.bundle("b1").unwrap();
    assert_eq!(bundle.url, "/books/b1");
    assert_eq!(bundle.description_embedding.len(), DIMS);
    let item = store.entry(EntryKind::Item, "i1").unwrap();
    assert_eq!(item.description, "about i1");
}

#[tokio::test]
async fn test_rerun_creates_no_duplicates() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(
        tmp.path(),
        "bundles-1.jsonl",
        &[
            record("b1", &["i1", "i2"], &["c1"]),
            record("b2", &["i2", "i3"], &["c1", "c2"]),
        ],
    );
    let store = InMemoryCatalog::new();
    let embedder = CountingEmbedder::new(DIMS);
    let cache_path = tmp.path().join("cache.json");

    load(&store, &embedder, &cache_path, &[file.clone()]).await;
    let first = store.counts().await.unwrap();
    let calls = embedder.calls();

    let second_report = load(&store, &embedder, &cache_path, &[file]).await;

    assert_eq!(store.counts().await.unwrap(), first);
    assert_eq!(
        first,
        CatalogCounts {
            bundles: 2,
            items: 3,
            charities: 2,
            bundle_items: 4,
            charity_bundles: 3,
        }
    );
    assert_eq!(second_report.bundles_created, 0);
    assert_eq!(second_report.bundles_existing, 2);
    assert_eq!(second_report.items_created, 0);
    assert_eq!(second_report.charities_created, 0);
    assert_eq!(second_report.item_links_created, 0);
    assert_eq!(second_report.charity_links_created, 0);
    // existing rows are never re-embedded
    assert_eq!(embedder.calls(), calls);
}

#[tokio::test]
async fn test_cached_vectors_skip_the_provider() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(
        tmp.path(),
        "bundles-1.jsonl",
        &[record("b1", &["i1"], &["c1"])],
    );
    let cache_path = tmp.path().join("cache.json");

    let mut seeded = VectorCache::new(&cache_path);
    for key in ["b1", "i1", "c1"] {
        seeded.insert(key, vec![0.25; DIMS]);
    }
    seeded.save().unwrap();

    let store = InMemoryCatalog::new();
    let embedder = CountingEmbedder::new(DIMS);
    let report = load(&store, &embedder, &cache_path, &[file]).await;

    assert_eq!(embedder.calls(), 0);
    assert_eq!(report.cache_hits, 3);
    assert_eq!(report.cache_misses, 0);
    assert_eq!(
        store.bundle("b1").unwrap().description_embedding,
        vec![0.25; DIMS]
    );
}

#[tokio::test]
async fn test_cache_file_carries_over_to_a_fresh_catalog() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(
        tmp.path(),
        "bundles-1.jsonl",
        &[record("b1", &["i1"], &["c1"])],
    );
    let cache_path = tmp.path().join("vector_cache").join("cache.json");

    let first_store = InMemoryCatalog::new();
    let first_embedder = CountingEmbedder::new(DIMS);
    load(&first_store, &first_embedder, &cache_path, &[file.clone()]).await;
    assert!(cache_path.exists());
    assert_eq!(VectorCache::load(&cache_path).unwrap().len(), 3);

    // Rebuilding the database from scratch reuses every vector.
    let second_store = InMemoryCatalog::new();
    let second_embedder = CountingEmbedder::new(DIMS);
    load(&second_store, &second_embedder, &cache_path, &[file]).await;

    assert_eq!(second_embedder.calls(), 0);
    assert_eq!(
        second_store.bundle("b1").unwrap().description_embedding,
        first_store.bundle("b1").unwrap().description_embedding
    );
}

#[tokio::test]
async fn test_extended_file_embeds_only_new_rows() {
    let tmp = TempDir::new().unwrap();
    let store = InMemoryCatalog::new();
    let embedder = CountingEmbedder::new(DIMS);
    let cache_path = tmp.path().join("cache.json");

    let first = write_file(
        tmp.path(),
        "bundles-1.jsonl",
        &[record("b1", &["i1"], &["c1"])],
    );
    load(&store, &embedder, &cache_path, &[first]).await;
    assert_eq!(embedder.calls(), 3);

    let second = write_file(
        tmp.path(),
        "bundles-2.jsonl",
        &[record("b2", &["i1", "i2"], &["c1"])],
    );
    let report = load(&store, &embedder, &cache_path, &[second]).await;

    // b2 and i2 are new; i1 and c1 already exist
    assert_eq!(embedder.calls(), 5);
    assert_eq!(report.items_created, 1);
    assert_eq!(report.items_existing, 1);
    assert_eq!(report.charities_existing, 1);
    assert_eq!(report.item_links_created, 2);
    assert_eq!(report.charity_links_created, 1);
}

#[tokio::test]
async fn test_bad_line_aborts_and_keeps_earlier_rows() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(
        tmp.path(),
        "bundles-1.jsonl",
        &[record("b1", &["i1"], &["c1"]), "{not json".to_string()],
    );
    let store = InMemoryCatalog::new();
    let embedder = CountingEmbedder::new(DIMS);
    let mut cache = VectorCache::new(tmp.path().join("cache.json"));

    let mut ingestor = Ingestor::new(&store, &embedder, &mut cache);
    let err = ingestor.ingest_files(&[file], None).await.unwrap_err();

    assert!(format!("{:#}", err).contains("bundles-1.jsonl:2"));
    assert_eq!(ingestor.report().records, 1);
    assert!(store.bundle("b1").is_some());
    // the cache is only written by a completed run
    assert!(!tmp.path().join("cache.json").exists());
}
