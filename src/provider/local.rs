//! Local provider: speaks to an on-host model server (Ollama-style API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProviderError;

use super::{
    types::{scrub_reasoning_tags, ChatRequest, ChatResponse},
    ChatProvider,
};

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: ApiOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    /// Suppress internal reasoning tags on models that support the flag.
    think: bool,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// On-host model server client.
pub struct LocalProvider {
    client: Client,
    base_url: String,
}

impl LocalProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatProvider for LocalProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = ApiChatRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            format: request.json_mode.then_some("json"),
            options: ApiOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                think: false,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let raw: Value = response.json().await?;
        let parsed: ApiChatResponse =
            serde_json::from_value(raw.clone()).unwrap_or(ApiChatResponse {
                message: None,
                model: None,
            });
        let content = parsed
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(ChatResponse {
            content: scrub_reasoning_tags(&content),
            model: parsed.model.unwrap_or(request.model),
            raw,
        })
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&json!({"model": model, "prompt": text}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: ApiEmbeddingResponse = response.json().await?;
        Ok(parsed.embedding)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
