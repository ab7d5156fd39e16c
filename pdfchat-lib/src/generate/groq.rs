use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{GenerationConfig, RequestConfig};
use crate::generate::{answer_or_placeholder, build_user_prompt, Generator, SYSTEM_PROMPT};
use crate::http::{build_client, send_with_retry, RetryPolicy};
use crate::{Error, Result};

/// Chat-completions client for Groq's OpenAI-compatible endpoint.
///
/// Any OpenAI-compatible base URL works; the request shape is the plain
/// `messages` + `temperature` + `max_tokens` form.
pub struct GroqGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl GroqGenerator {
    pub fn from_config(config: &GenerationConfig, request: &RequestConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(request.timeout())
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().unwrap_or_default().trim().to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: RetryPolicy::from_config(request),
        })
    }

    fn request<'a>(&'a self, user_prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        }
    }
}

#[async_trait]
impl Generator for GroqGenerator {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let prompt = build_user_prompt(context, question);
        let body = self.request(&prompt);
        debug!(model = %self.model, context_chars = context.len(), "Requesting completion");

        let resp = send_with_retry(&self.retry, "Groq chat completions", || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await
        .map_err(Error::Generation)?;

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::Generation(format!("failed to parse completion response: {e}")))?;
        let answer = answer_or_placeholder(first_completion(parsed));
        info!(model = %self.model, answer_chars = answer.len(), "Answer generated");
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn first_completion(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
