//! Test doubles for the external services.
//!
//! Used by unit tests and the `tests/` integration suites in place of the
//! embedding model and the language model.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bundle_search_core::embedding::Embedder;
use bundle_search_core::intent::{parse_intent, Intent, IntentClassifier};

/// Deterministic embedder that counts the texts it is asked to embed.
///
/// Texts registered with [`CountingEmbedder::set`] map to that vector;
/// anything else maps to a constant vector derived from the text length.
pub struct CountingEmbedder {
    dims: usize,
    calls: AtomicUsize,
    fixed: Mutex<HashMap<String, Vec<f32>>>,
}

impl CountingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
            fixed: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.fixed.lock().unwrap().insert(text.to_string(), vector);
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.fixed.lock().unwrap().get(text) {
            return v.clone();
        }
        let value = (text.len() % 10) as f32 / 100.0;
        vec![value; self.dims]
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Classifier that answers every query with the same raw model reply.
pub struct ScriptedClassifier {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(&self, query: &str) -> Result<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(parse_intent(&self.reply, query)?)
    }
}
