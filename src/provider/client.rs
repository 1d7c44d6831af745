//! OpenAI-compatible API client
//!
//! One HTTP client covers both provider surfaces the memory subsystem needs:
//! chat completions (fact extraction) and embeddings (vector generation).

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::provider::types::*;
use crate::provider::{ChatProvider, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

/// OpenAI-compatible API client
#[derive(Clone)]
pub struct OpenAiClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: ProviderConfig,
}

impl OpenAiClient {
    /// Create a new provider client
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!(
                "Bearer {}",
                config.api_key.expose_secret()
            ))
            .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenAiClient { client, config })
    }

    /// Get the configured chat model
    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    /// Get the configured embedding model
    pub fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    /// Create a chat completion with the configured chat model
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> Result<ChatCompletionResponse> {
        let request = ChatCompletionRequest {
            model: self.config.chat_model.clone(),
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!("Sending chat completion request: model={}", request.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let body = response.json::<ChatCompletionResponse>().await?;
        if let Some(ref usage) = body.usage {
            info!(
                "Chat completion response: model={}, tokens={}",
                body.model, usage.total_tokens
            );
        }

        Ok(body)
    }

    /// Generate embeddings for a batch of texts, in input order
    pub async fn embeddings(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: texts,
        };

        let url = format!("{}/embeddings", self.config.base_url);
        debug!(
            "Sending embeddings request: model={}, inputs={}",
            request.model,
            request.input.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        let body = response.json::<EmbeddingResponse>().await?;

        // The API tags each vector with its input index; restore input order.
        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Map a reqwest transport failure to the error taxonomy
fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("provider request timed out: {}", e))
    } else {
        Error::Http(e)
    }
}

/// Map a non-success API status to the error taxonomy
fn api_error(status: reqwest::StatusCode, body: String) -> Error {
    match status.as_u16() {
        429 => {
            warn!("Provider rate limit exceeded: {}", body);
            Error::RateLimit(body)
        }
        401 => Error::Provider("invalid API key".to_string()),
        _ => Error::Provider(format!("API error ({}): {}", status, body)),
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let messages = vec![Message::system(system_prompt), Message::user(user_text)];
        let mut options = GenerationOptions::precise();
        options.max_tokens = Some(512);

        let response = self.chat(messages, options).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Provider("empty chat completion response".to_string()))?;

        Ok(content)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embeddings(texts.to_vec()).await
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> ProviderConfig {
        ProviderConfig {
            api_key: SecretString::from("test-key"),
            base_url,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 3,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_client_creation() {
        let config = test_config("https://api.openai.com/v1".to_string());
        assert!(OpenAiClient::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_embeddings_restore_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.4, 0.5, 0.6], "index": 1},
                    {"embedding": [0.1, 0.2, 0.3], "index": 0}
                ],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let vectors = client
            .embeddings(vec!["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn test_embeddings_empty_input_short_circuits() {
        // No mock mounted: a request would fail, so this proves no call is made.
        let server = MockServer::start().await;
        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let vectors = client.embeddings(vec![]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_typed_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let err = client
            .embeddings(vec!["text".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let err = client
            .chat(vec![Message::user("hi")], GenerationOptions::precise())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn test_complete_sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "reply with JSON"},
                    {"role": "user", "content": "I love hiking"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "[\"User enjoys hiking\"]"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 6, "total_tokens": 16}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let content = client.complete("reply with JSON", "I love hiking").await.unwrap();
        assert_eq!(content, "[\"User enjoys hiking\"]");
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let err = client
            .embeddings(vec!["text".to_string()])
            .await
            .unwrap_err();
        // reqwest surfaces body-decode failures through its own error type
        assert!(matches!(err, Error::Http(_)));
    }
}
