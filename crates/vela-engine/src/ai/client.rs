//! HTTP client for the chat-completions decision API.
//!
//! Speaks the OpenAI-compatible wire shape (DeepSeek uses it verbatim):
//! `POST {base}/chat/completions` with bearer auth and a two-message
//! conversation. Network and HTTP failures are errors (the engine skips the
//! cycle and retries next interval); content that arrives but fails to
//! validate becomes HOLD inside [`parse::parse_decision`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use vela_core::error::VelaError;
use vela_core::types::Decision;

use super::{DecisionProvider, EntryContext, ManageContext, parse, prompt};

const DEFAULT_MODEL: &str = "deepseek-chat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Chat-completions decision client.
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self { http, api_key, base_url, model: DEFAULT_MODEL.to_string() }
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.3,
            "max_tokens": 1000,
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp: Value = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("decision API request failed")?
            .error_for_status()
            .context("decision API HTTP error")?
            .json()
            .await
            .context("decision API returned non-JSON body")?;

        let content = resp
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VelaError::AiClient("response missing message content".to_string())
            })?;

        debug!("decision API returned {} chars", content.len());
        Ok(content.to_string())
    }
}

#[async_trait]
impl DecisionProvider for AiClient {
    async fn decide_entry(&self, ctx: &EntryContext<'_>) -> Result<Decision> {
        let user = prompt::build_entry_prompt(ctx);
        let content = self.complete(prompt::ENTRY_SYSTEM_PROMPT, &user).await?;
        Ok(parse::parse_decision(&content))
    }

    async fn decide_manage(&self, ctx: &ManageContext<'_>) -> Result<Decision> {
        let user = prompt::build_manage_prompt(ctx);
        let content = self.complete(prompt::MANAGE_SYSTEM_PROMPT, &user).await?;
        Ok(parse::parse_decision(&content))
    }
}
