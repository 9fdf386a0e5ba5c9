//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for pgvector text literals and L2 distance.
//!
//! Concrete providers (fastembed, Ollama) live in the `bundle-search` app
//! crate.

use anyhow::{bail, Result};
use async_trait::async_trait;

/// Trait for embedding providers.
///
/// Implementations are created once at process start and passed by
/// reference to the ingestion pipeline and the search service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"paraphrase-multilingual-mpnet-base-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;
        check_dims(&vector, self.dims())?;
        Ok(vector)
    }
}

/// Fail unless `vector` has exactly `dims` components.
pub fn check_dims(vector: &[f32], dims: usize) -> Result<()> {
    if vector.len() != dims {
        bail!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            dims
        );
    }
    Ok(())
}

/// Format a vector as a pgvector text literal: `[0.1,0.2,...]`.
///
/// # Example
///
/// ```rust
/// use bundle_search_core::embedding::vector_literal;
///
/// assert_eq!(vector_literal(&[1.0, -2.5, 0.125]), "[1,-2.5,0.125]");
/// ```
pub fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Euclidean distance, the metric behind pgvector's `<->` operator.
///
/// Returns `f64::INFINITY` for vectors of different lengths so they never
/// pass a distance threshold.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(l2_distance(&v, &v), 0.0);
    }

    #[test]
    fn test_l2_pythagorean() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_l2_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert!(l2_distance(&a, &b).is_infinite());
    }

    #[test]
    fn test_vector_literal_empty() {
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(&[0.0; 768], 768).is_ok());
        let err = check_dims(&[0.0; 384], 768).unwrap_err();
        assert!(err.to_string().contains("384"));
    }
}
