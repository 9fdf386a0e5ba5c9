//! Embedding provider implementations.
//!
//! Concrete backends for the core [`Embedder`] trait:
//! - **[`LocalProvider`]**: runs a sentence-embedding model in-process via
//!   fastembed; the model is downloaded once into the cache directory
//!   (`MODEL_PATH`) and loaded a single time per process. Output vectors are
//!   not unit-normalised by default.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed`
//!   endpoint, which returns unit-length vectors.
//!
//! Use [`create_embedder`] to build the provider named in configuration.
//!
//! # Retry Strategy
//!
//! The Ollama provider retries transient errors with exponential backoff
//! when `embedding.max_retries > 0` (the default is 0, fail fast):
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use bundle_search_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). The model must already be pulled.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?delay, "retrying ollama embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_ollama_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Ollama API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed after retries")))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Local Provider (fastembed) ============

/// Session outputs tried, in order, when pooling raw vectors.
#[cfg(feature = "local-embeddings-fastembed")]
const OUTPUT_PRECEDENCE: &[fastembed::OutputKey] = &[
    fastembed::OutputKey::OnlyOne,
    fastembed::OutputKey::ByName("last_hidden_state"),
    fastembed::OutputKey::ByName("sentence_embedding"),
];

/// In-process embedding provider backed by fastembed.
///
/// The ONNX model is loaded once in [`LocalProvider::new`] and shared
/// behind a mutex; loading and inference both run on tokio's blocking pool.
///
/// Vectors are the model's pooled output without unit normalisation unless
/// `embedding.normalize` is set, so `<->` distances span the same range as
/// the stored catalog and the default distance threshold.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    normalize: bool,
    pooling: Option<fastembed::Pooling>,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub async fn new(config: &EmbeddingConfig) -> Result<Self> {
        let fastembed_model = config_to_fastembed_model(&config.model)?;
        let pooling = fastembed::TextEmbedding::get_default_pooling_method(&fastembed_model);

        let mut options =
            fastembed::TextInitOptions::new(fastembed_model).with_show_download_progress(true);
        if let Some(dir) = &config.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        tracing::info!(model = %config.model, "loading local embedding model");
        let model = tokio::task::spawn_blocking(move || fastembed::TextEmbedding::try_new(options))
            .await?
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            normalize: config.normalize,
            pooling,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

/// Pool each batch's session output into one raw vector per input text.
#[cfg(feature = "local-embeddings-fastembed")]
fn pooled_rows(
    batches: &[fastembed::SingleBatchOutput],
    pooling: Option<fastembed::Pooling>,
) -> anyhow::Result<Vec<Vec<f32>>> {
    let mut rows = Vec::new();
    for batch in batches {
        let array = batch.select_and_pool_output(&OUTPUT_PRECEDENCE, pooling.clone())?;
        for row in array.rows() {
            rows.push(row.iter().copied().collect());
        }
    }
    Ok(rows)
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let normalize = self.normalize;
        let pooling = self.pooling.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if normalize {
                return model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e));
            }
            let output = model
                .transform(texts.as_slice(), Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?;
            output.export_with_transformer(|batches| pooled_rows(batches, pooling.clone()))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "paraphrase-multilingual-mpnet-base-v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMpnetBaseV2)
        }
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported 768-dim models: \
             paraphrase-multilingual-mpnet-base-v2, multilingual-e5-base, \
             bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

/// Create the [`Embedder`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"local"` | [`LocalProvider`] (requires the `local-embeddings-fastembed` feature) |
/// | `"ollama"` | [`OllamaProvider`] |
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config).await?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({"embeddings": [[0.5, 1.0], [-1.0, 0.0]]});
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![0.5, 1.0], vec![-1.0, 0.0]]);
    }

    #[test]
    fn test_parse_ollama_response_missing_array() {
        assert!(parse_ollama_response(&json!({"error": "model not found"})).is_err());
        assert!(parse_ollama_response(&json!({"embeddings": [1.0]})).is_err());
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_ollama_provider_metadata() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = create_embedder(&config).await.unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dims(), 768);
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    #[tokio::test(flavor = "current_thread")]
    async fn test_local_provider_rejects_unknown_model_before_loading() {
        let config = EmbeddingConfig {
            model: "all-minilm-l6-v2".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).await.err().unwrap();
        assert!(err.to_string().contains("Unknown local embedding model"));
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    #[test]
    fn test_unknown_local_model() {
        assert!(config_to_fastembed_model("all-minilm-l6-v2").is_err());
        assert!(config_to_fastembed_model("paraphrase-multilingual-mpnet-base-v2").is_ok());
    }
}
