//! Query pipeline: classify, embed, search.
//!
//! A search runs four steps:
//!
//! 1. the classifier turns free text into an [`Intent`],
//! 2. `charity` and `item` intents stop here with a fixed message,
//! 3. the intent's `query` text is embedded with the same provider used at
//!    ingestion,
//! 4. a [`BundleQuery`] is planned from the intent and run against the store.
//!
//! Whitespace-only input returns [`SearchOutcome::Empty`] without calling
//! any collaborator. [`SearchService`] is shared by the CLI and the HTTP
//! server; both construct it once per process.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use bundle_search_core::embedding::Embedder;
use bundle_search_core::intent::{Intent, IntentClassifier};
use bundle_search_core::models::BundleHit;
use bundle_search_core::query::{BundleQuery, QueryParams};
use bundle_search_core::store::CatalogStore;

use crate::classifier::AnthropicClassifier;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::pg_store::PgCatalog;

/// A bundle hit with its absolute link.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub bundle: BundleHit,
    pub link: String,
}

/// Result of one search.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// The query was empty or whitespace.
    Empty,
    /// The intent targets something that cannot be searched yet.
    Unsupported { intent: Intent, message: String },
    /// A bundle search ran. `sql` and `params` are the statement as sent.
    Results {
        intent: Intent,
        sql: String,
        params: Vec<String>,
        hits: Vec<SearchHit>,
    },
}

/// Join the configured base URL with a bundle's relative `url`.
pub fn bundle_link(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let base = base.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{}{}", base, url)
    } else {
        format!("{}/{}", base, url)
    }
}

/// The query pipeline and its collaborators.
pub struct SearchService {
    classifier: Arc<dyn IntentClassifier>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CatalogStore>,
    params: QueryParams,
    link_base_url: String,
}

impl SearchService {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn CatalogStore>,
        params: QueryParams,
        link_base_url: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            embedder,
            store,
            params,
            link_base_url: link_base_url.into(),
        }
    }

    /// Build the production service: Anthropic classifier, configured
    /// embedding provider and the Postgres catalog.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let classifier = AnthropicClassifier::new(&config.intent)?;
        let embedder = create_embedder(&config.embedding).await?;
        let pool = db::connect(&config.db).await?;

        Ok(Self::new(
            Arc::new(classifier),
            embedder,
            Arc::new(PgCatalog::new(pool)),
            config.search.query_params(),
            config.search.link_base_url.clone(),
        ))
    }

    /// Run one query through the pipeline.
    ///
    /// # Errors
    ///
    /// Classifier failures (including unparseable replies, which carry an
    /// [`IntentError`](bundle_search_core::intent::IntentError)), embedding
    /// failures and store failures are returned as-is.
    pub async fn search(&self, text: &str) -> Result<SearchOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SearchOutcome::Empty);
        }

        let intent = self.classifier.classify(text).await?;
        debug!(?intent, "classified query");

        if let Some(message) = intent.target.unsupported_message() {
            info!(intent = ?intent.target, "unsupported intent");
            return Ok(SearchOutcome::Unsupported {
                intent,
                message: message.to_string(),
            });
        }

        let embedding = self.embedder.embed_one(&intent.query).await?;
        let query = BundleQuery::build(&intent, embedding, &self.params)?;
        let sql = query.to_sql();
        debug!(%sql, "bundle query");

        let hits = self
            .store
            .search_bundles(&query)
            .await?
            .into_iter()
            .map(|bundle| SearchHit {
                link: bundle_link(&self.link_base_url, &bundle.url),
                bundle,
            })
            .collect::<Vec<_>>();
        info!(hits = hits.len(), "bundle search complete");

        Ok(SearchOutcome::Results {
            intent,
            sql,
            params: query.describe_params(),
            hits,
        })
    }
}

/// CLI entry point for `bundle-search search`.
pub async fn run_search(config: &Config, text: &str, debug: bool, json: bool) -> Result<()> {
    if text.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let service = SearchService::from_config(config).await?;
    let outcome = service.search(text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        SearchOutcome::Empty => println!("No results."),
        SearchOutcome::Unsupported { message, .. } => println!("{}", message),
        SearchOutcome::Results {
            intent,
            sql,
            params,
            hits,
        } => {
            if debug {
                println!("intent: {}", serde_json::to_string(intent)?);
                println!("sql:\n{}", sql);
                println!("params: {}", params.join(", "));
                println!();
            }

            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let b = &hit.bundle;
                println!(
                    "{}. [{:.3}] {} ({})",
                    i + 1,
                    b.distance,
                    b.human_name,
                    b.media_type
                );
                if !b.author.is_empty() {
                    println!("    author: {}", b.author);
                }
                println!(
                    "    runs: {} to {}",
                    b.start_date.format("%Y-%m-%d"),
                    b.end_date.format("%Y-%m-%d")
                );
                println!("    link: {}", hit.link);
                println!("    id: {}", b.machine_name);
                println!();
            }
        }
    }

    Ok(())
}
