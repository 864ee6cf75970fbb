use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timebridge_core::config::{LlmConfig, LlmProvider};
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const SYSTEM_MESSAGE: &str = "You are a strict JSON calendar intent extractor. Reply ONLY with a \
single JSON object, with no markdown, no backticks, and no extra text.";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response contained no message content")]
    EmptyResponse,
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse | Self::Decode(_) | Self::Configuration(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI and Ollama's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(base_url)) => base_url.to_string(),
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (LlmProvider::Ollama, None) => {
                return Err(LlmError::Configuration(
                    "ollama provider needs llm.base_url".to_string(),
                ))
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: chat_completions_url(&base_url),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_MESSAGE },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 0.1,
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        extract_content(&body)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(content) => {
                    debug!(
                        event_name = "llm.completion.received",
                        attempt,
                        response_len = content.len(),
                        "llm completion received"
                    );
                    return Ok(content);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.completion.retry",
                        attempt,
                        error = %error,
                        "retrying llm completion"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

fn chat_completions_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    format!("{trimmed}{CHAT_COMPLETIONS_PATH}")
}

fn extract_content(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|error| LlmError::Decode(error.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

/// Replays canned completions in order and records every prompt it was sent.
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for response in responses {
            client.push_response(response);
        }
        client
    }

    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.responses).push_back(Err(message.into()));
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());
        match lock(&self.responses).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted llm client has no responses left")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
