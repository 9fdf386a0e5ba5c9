//! Persistent embedding cache for the ingestion pipeline.
//!
//! A flat `machine_name → vector` map stored as one JSON object. The file is
//! read once when the pipeline starts and rewritten in full by
//! [`VectorCache::save`] at the end of a successful run; nothing is written
//! mid-run. Entries are never invalidated when a record's text changes.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use bundle_search_core::embedding::Embedder;

pub struct VectorCache {
    path: PathBuf,
    entries: BTreeMap<String, Vec<f32>>,
    hits: u64,
    misses: u64,
}

impl VectorCache {
    /// An empty cache that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Load the cache file at `path`, or start empty if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cache = Self::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "no vector cache file, starting empty");
            return Ok(cache);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vector cache: {}", path.display()))?;
        cache.entries = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse vector cache: {}", path.display()))?;
        debug!(entries = cache.entries.len(), "loaded vector cache");
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Vec<f32>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, vector: Vec<f32>) {
        self.entries.insert(key.into(), vector);
    }

    /// Lookups answered from the cache so far.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that had to call the embedding provider so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Return the cached vector for `key`, or embed `text` and remember it.
    ///
    /// A cached key never reaches the provider. A cached vector whose length
    /// does not match the provider's dimensionality is an error.
    pub async fn get_or_embed(
        &mut self,
        key: &str,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<Vec<f32>> {
        if let Some(cached) = self.entries.get(key) {
            if cached.len() != embedder.dims() {
                bail!(
                    "cached vector for '{}' in {} has {} dimensions, expected {}",
                    key,
                    self.path.display(),
                    cached.len(),
                    embedder.dims()
                );
            }
            self.hits += 1;
            return Ok(cached.clone());
        }

        let vector = embedder
            .embed_one(text)
            .await
            .with_context(|| format!("Failed to embed '{}'", key))?;
        self.misses += 1;
        self.entries.insert(key.to_string(), vector.clone());
        Ok(vector)
    }

    /// Rewrite the cache file with every entry.
    ///
    /// Writes to a sibling temporary file first and renames it over the
    /// target, so an interrupted save leaves the previous file intact.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory: {}", parent.display())
                })?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string(&self.entries)?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write vector cache: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace vector cache: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingEmbedder;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hit_skips_provider() {
        let embedder = CountingEmbedder::new(4);
        let mut cache = VectorCache::new("unused.json");
        cache.insert("known", vec![1.0, 2.0, 3.0, 4.0]);

        let v = cache.get_or_embed("known", "text", &embedder).await.unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(embedder.calls(), 0);
        assert_eq!(cache.hits(), 1);

        cache.get_or_embed("new", "text", &embedder).await.unwrap();
        cache.get_or_embed("new", "text", &embedder).await.unwrap();
        assert_eq!(embedder.calls(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 2);
    }

    #[tokio::test]
    async fn test_wrong_dims_is_error() {
        let embedder = CountingEmbedder::new(4);
        let mut cache = VectorCache::new("stale-cache.json");
        cache.insert("stale", vec![1.0, 2.0]);

        let err = cache
            .get_or_embed("stale", "text", &embedder)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'stale'"));
        assert!(msg.contains("stale-cache.json"));
        assert!(msg.contains("expected 4"));
        assert_eq!(embedder.calls(), 0);
        assert_eq!(cache.get("stale").unwrap().len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("cache.json");

        let mut cache = VectorCache::new(&path);
        cache.insert("a", vec![0.5, -1.0]);
        cache.insert("b", vec![2.0, 0.25]);
        cache.save().unwrap();

        let loaded = VectorCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("a"), Some(&vec![0.5, -1.0]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = VectorCache::load(&tmp.path().join("absent.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(VectorCache::load(&path).is_err());
    }

    #[test]
    fn test_reads_python_style_floats() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        std::fs::write(&path, r#"{"x": [0.1, -2, 3.5e-3]}"#).unwrap();
        let cache = VectorCache::load(&path).unwrap();
        assert_eq!(cache.get("x").unwrap().len(), 3);
    }
}
