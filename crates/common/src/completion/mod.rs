//! Chat completion abstraction
//!
//! The engine consumes language models through a single operation,
//! `complete(messages) -> text`. Implementations:
//! - OpenAI-compatible `/chat/completions` endpoints
//! - A canned mock for local runs

use crate::config::CompletionConfig;
use crate::errors::{is_transient_status, AppError, Result};
use crate::metrics;
use crate::resilience::{call_with_retry, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the ordered message list sent to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Trait for chat completion
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete the conversation and return the assistant text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI chat completion client
pub struct OpenAIChatCompleter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
    policy: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatCompleter {
    /// Create a new completion client
    pub fn new(api_key: String, config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            policy: RetryPolicy::new(config.timeout_secs, config.max_retries, config.initial_backoff_ms),
        })
    }

    async fn call_llm(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::CompletionTimeout {
                        timeout_ms: self.policy.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::CompletionError {
                        message: format!("LLM API request failed: {}", e),
                        transient: e.is_connect() || e.is_request(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionError {
                message: format!("LLM API error {}: {}", status, body),
                transient: is_transient_status(status),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::CompletionError {
            message: format!("Failed to parse LLM response: {}", e),
            transient: false,
        })?;

        // An empty choice list is a broken response; empty content is a valid (if useless) answer.
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default().trim().to_string())
            .ok_or_else(|| AppError::CompletionError {
                message: "Empty response from LLM".to_string(),
                transient: false,
            })
    }
}

#[async_trait]
impl Completer for OpenAIChatCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        let result = call_with_retry(
            &self.policy,
            "completion",
            |timeout_ms| AppError::CompletionTimeout { timeout_ms },
            || self.call_llm(messages),
        )
        .await;

        metrics::record_completion(start.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline completer that answers without calling any model
pub struct MockCompleter;

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.lines().next().unwrap_or_default().to_string())
            .unwrap_or_default();

        Ok(format!(
            "Respuesta de prueba basada en el contexto recuperado.\n{}\n\n[Mock response - LLM API key not configured]",
            question
        ))
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a completer based on configuration
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn Completer>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "completion.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIChatCompleter::new(key, config)?))
        }
        "mock" => Ok(Arc::new(MockCompleter)),
        other => Err(AppError::Configuration {
            message: format!("Unknown completion provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::system("Sos especialista")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "Sos especialista");
    }

    #[test]
    fn test_endpoint_from_custom_base() {
        let config = CompletionConfig {
            api_base: Some("http://localhost:11434/v1/".to_string()),
            ..CompletionConfig::default()
        };
        let completer = OpenAIChatCompleter::new("sk-test".to_string(), &config).unwrap();
        assert_eq!(completer.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_response_with_null_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_mock_completer_echoes_question() {
        let reply = MockCompleter
            .complete(&[ChatMessage::system("rules"), ChatMessage::user("Consulta: \"¿qué es BPM?\"")])
            .await
            .unwrap();
        assert!(reply.contains("¿qué es BPM?"));
    }

    #[test]
    fn test_openai_provider_requires_key() {
        assert!(create_completer(&CompletionConfig::default()).is_err());
        let mock = CompletionConfig {
            provider: "mock".to_string(),
            ..CompletionConfig::default()
        };
        assert_eq!(create_completer(&mock).unwrap().model_name(), "mock-completion");
    }
}
