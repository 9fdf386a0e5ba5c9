//! Intent classification through the Anthropic Messages API.
//!
//! The user's query is substituted into a prompt template at the
//! `{{USER_QUERY}}` placeholder and sent as a single user message. The text
//! of the first content block in the reply is parsed with
//! [`parse_intent`]; a reply that is not intent JSON fails the query with an
//! [`IntentError`](bundle_search_core::intent::IntentError). There is no
//! retry.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use bundle_search_core::intent::{parse_intent, Intent, IntentClassifier};

use crate::config::IntentConfig;

/// Built-in prompt, used when `intent.prompt_path` is unset.
pub const DEFAULT_PROMPT: &str = include_str!("../prompts/intent-prompt.txt");

const PLACEHOLDER: &str = "{{USER_QUERY}}";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Classifier backed by a Claude model.
pub struct AnthropicClassifier {
    api_key: String,
    model: String,
    max_tokens: u32,
    api_url: String,
    prompt: String,
    client: reqwest::Client,
}

impl AnthropicClassifier {
    /// Create a classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `ANTHROPIC_API_KEY` is not set, the prompt file
    /// cannot be read, or the prompt lacks the `{{USER_QUERY}}` placeholder.
    pub fn new(config: &IntentConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &IntentConfig, api_key: String) -> Result<Self> {
        let prompt = match &config.prompt_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read intent prompt: {}", path.display()))?,
            None => DEFAULT_PROMPT.to_string(),
        };
        if !prompt.contains(PLACEHOLDER) {
            bail!("intent prompt must contain the {} placeholder", PLACEHOLDER);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            prompt,
            client,
        })
    }

    pub fn render_prompt(&self, query: &str) -> String {
        self.prompt.replace(PLACEHOLDER, query)
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Extract the first text block from a Messages API response body.
fn first_text(body: &str) -> Result<String> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).context("Invalid Anthropic response body")?;
    parsed
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| anyhow::anyhow!("Anthropic response has no text content"))
}

#[async_trait]
impl IntentClassifier for AnthropicClassifier {
    async fn classify(&self, query: &str) -> Result<Intent> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": self.render_prompt(query) }
            ],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Intent classifier request failed")?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!("Anthropic API error {}: {}", status, text);
        }

        let reply = first_text(&text)?;
        debug!(%reply, "intent classifier reply");
        Ok(parse_intent(&reply, query)?)
    }
}
