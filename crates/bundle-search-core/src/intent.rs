//! Structured query intent and classifier output parsing.
//!
//! The language model replies with a JSON object:
//!
//! ```json
//! {"intent": "bundle", "query": "space strategy", "ebook": false,
//!  "game": true, "software": false, "current": true}
//! ```
//!
//! [`parse_intent`] turns that reply into an [`Intent`]. The three media
//! booleans collapse into a single [`MediaType`] at this point, first true
//! wins in the order ebook, game, software, so nothing downstream ever sees
//! more than one media filter.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MediaType;

/// The entity type a query is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentTarget {
    Bundle,
    Charity,
    Item,
}

impl IntentTarget {
    /// The fixed user-facing message for targets that have no search yet.
    pub fn unsupported_message(self) -> Option<&'static str> {
        match self {
            IntentTarget::Bundle => None,
            IntentTarget::Charity => Some("Charity-specific queries are not supported yet"),
            IntentTarget::Item => Some("Item-specific queries are not supported yet"),
        }
    }
}

/// A classified user query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    #[serde(rename = "intent")]
    pub target: IntentTarget,
    /// Text to embed for the similarity search.
    pub query: String,
    /// Media-type filter, if any.
    pub media_type: Option<MediaType>,
    /// Restrict to bundles whose `end_date` is still in the future.
    pub current: bool,
}

/// Errors from interpreting classifier output.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("intent classifier returned an empty reply")]
    Empty,
    #[error("intent classifier reply is not valid intent JSON: {source} (reply: {raw})")]
    Malformed {
        #[source]
        source: serde_json::Error,
        raw: String,
    },
}

/// Trait for intent classifiers.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify free text into an [`Intent`].
    ///
    /// A reply that cannot be parsed surfaces as an [`IntentError`] inside
    /// the returned `anyhow::Error`.
    async fn classify(&self, query: &str) -> Result<Intent>;
}

#[derive(Deserialize)]
struct RawIntent {
    intent: IntentTarget,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    ebook: Option<bool>,
    #[serde(default)]
    game: Option<bool>,
    #[serde(default)]
    software: Option<bool>,
    #[serde(default)]
    current: Option<bool>,
}

/// Pick the media filter from the three classifier flags.
pub fn media_filter(ebook: bool, game: bool, software: bool) -> Option<MediaType> {
    if ebook {
        Some(MediaType::Ebook)
    } else if game {
        Some(MediaType::Game)
    } else if software {
        Some(MediaType::Software)
    } else {
        None
    }
}

/// Parse a classifier reply.
///
/// `user_query` is used as the search text when the reply has no `query`
/// field (or an empty one). A reply wrapped in a Markdown code fence is
/// unwrapped first.
pub fn parse_intent(reply: &str, user_query: &str) -> Result<Intent, IntentError> {
    let body = strip_code_fence(reply);
    if body.is_empty() {
        return Err(IntentError::Empty);
    }

    let raw: RawIntent = serde_json::from_str(body).map_err(|source| IntentError::Malformed {
        source,
        raw: reply.to_string(),
    })?;

    let query = raw
        .query
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| user_query.to_string());

    Ok(Intent {
        target: raw.intent,
        query,
        media_type: media_filter(
            raw.ebook.unwrap_or(false),
            raw.game.unwrap_or(false),
            raw.software.unwrap_or(false),
        ),
        current: raw.current.unwrap_or(false),
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json"), which may run straight into the body.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.trim_end().trim_end_matches("```").trim()
}
