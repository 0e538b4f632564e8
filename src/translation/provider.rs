//! External text-translation providers.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 5000;

/// Translates committed source text. Implementations must be safe to race
/// against a timeout: a dropped future is a cancelled request.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: Option<&str>,
        target_language: &str,
    ) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Translation via an OpenAI-compatible chat-completions endpoint.
pub struct CloudTranslationProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl CloudTranslationProvider {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Self::validate_api_key(api_key).map_err(|e| anyhow!(e))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| anyhow!("Invalid authorization header value: {}", e))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    /// Validate an API key before saving
    pub fn validate_api_key(key: &str) -> Result<(), String> {
        if key.is_empty() {
            return Err("API key cannot be empty".to_string());
        }
        if key.len() < 20 {
            return Err("API key seems too short".to_string());
        }
        Ok(())
    }

    /// Execute an async operation with exponential backoff retry logic
    async fn with_retry<F, Fut, T>(operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);

        for attempt in 0..MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < MAX_RETRIES - 1 => {
                    warn!(
                        "{} attempt {} failed: {}, retrying in {:?}...",
                        operation_name,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_millis(MAX_RETRY_DELAY_MS));
                }
                Err(e) => {
                    return Err(anyhow!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        MAX_RETRIES,
                        e
                    ));
                }
            }
        }
        unreachable!()
    }

    async fn request_translation(&self, prompt: String) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending translation request to: {}", url);

        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self.client.post(&url).json(&request_body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Translation request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Translation response contained no content"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl TranslationProvider for CloudTranslationProvider {
    async fn translate(
        &self,
        text: &str,
        source_language: Option<&str>,
        target_language: &str,
    ) -> Result<String> {
        let prompt = build_translation_prompt(text, source_language, target_language);
        Self::with_retry("translate", || self.request_translation(prompt.clone())).await
    }
}

pub(crate) fn build_translation_prompt(
    text: &str,
    source_language: Option<&str>,
    target_language: &str,
) -> String {
    match source_language {
        Some(source) => format!(
            "Translate the following {} text to {}. Reply with only the translation.\n\n{}",
            source, target_language, text
        ),
        None => format!(
            "Translate the following text to {}. Reply with only the translation.\n\n{}",
            target_language, text
        ),
    }
}
