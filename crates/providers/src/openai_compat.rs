//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions` and `/embeddings` in the OpenAI wire format.
//!
//! A provider built without an API key reports
//! [`ProviderError::Unavailable`] from every call instead of hitting the
//! network, so an unconfigured deployment degrades instead of failing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use weft_config::ProviderConfig;
use weft_core::error::ProviderError;
use weft_core::message::{Role, Turn};
use weft_core::provider::{Completion, CompletionProvider, CompletionRequest, EmbeddingGenerator};

/// An OpenAI-compatible completion and embedding provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_model: default_model.into(),
            embedding_model: embedding_model.into(),
            client,
        }
    }

    /// Build a provider from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig, default_model: impl Into<String>) -> Self {
        Self::new(
            "openai_compat",
            config.api_url.clone(),
            config.api_key.clone(),
            default_model,
            config.embedding_model.clone(),
        )
    }

    /// Whether an API key is configured.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Unavailable(format!("provider '{}' has no API key", self.name))
        })
    }

    /// Convert turns to the OpenAI message format.
    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        turns
            .iter()
            .map(|t| ApiMessage {
                role: match t.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(t.content.clone()),
            })
            .collect()
    }

    fn completion_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.default_model),
            "messages": Self::to_api_messages(&request.messages),
            "stream": false,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.api_key()?;
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::Unavailable(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = self.completion_body(&request);
        debug!(provider = %self.name, model = %body["model"], "Sending completion request");

        let response = self.post("chat/completions", &body).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
        })
    }
}

#[async_trait]
impl EmbeddingGenerator for OpenAiCompatProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(provider = %self.name, model = %self.embedding_model, "Sending embedding request");

        let response = self.post("embeddings", &body).await?;
        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("No embedding in response".into()))
    }
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1/",
            None,
            "gpt-4o-mini",
            "text-embedding-3-small",
        )
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        assert_eq!(unconfigured().base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn blank_key_counts_as_unconfigured() {
        let provider = OpenAiCompatProvider::new("p", "http://x", Some("  ".into()), "m", "e");
        assert!(!provider.is_configured());
    }

    #[test]
    fn from_config_uses_section_values() {
        let config = ProviderConfig {
            api_url: "http://localhost:11434/v1".into(),
            api_key: Some("ollama".into()),
            embedding_model: "nomic-embed-text".into(),
        };
        let provider = OpenAiCompatProvider::from_config(&config, "llama3");
        assert!(provider.is_configured());
        assert_eq!(provider.embedding_model, "nomic-embed-text");
        assert_eq!(provider.default_model, "llama3");
    }

    #[test]
    fn message_conversion() {
        let turns = vec![Turn::system("You are helpful"), Turn::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&turns);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn completion_body_applies_defaults_and_overrides() {
        let provider = unconfigured();
        let mut request = CompletionRequest::new(vec![Turn::user("hi")]);
        let body = provider.completion_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert!(body.get("temperature").is_none());

        request.model = Some("gpt-4o".into());
        request.temperature = Some(0.3);
        request.max_tokens = Some(300);
        let body = provider.completion_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 300);
        assert!(body["temperature"].is_number());
    }

    #[tokio::test]
    async fn unconfigured_completion_is_unavailable() {
        let err = unconfigured()
            .complete(CompletionRequest::new(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unconfigured_embedding_is_unavailable() {
        let err = unconfigured().embed("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
