use crate::config::{LLMConfig, LLMProvider};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// A single system + user exchange with a language model.
pub trait ChatModel {
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<Completion>> + Send;
}

impl<M: ChatModel + ?Sized> ChatModel for &M {
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<Completion>> + Send {
        (**self).complete(system, user)
    }
}

pub struct LLMClient {
    config: LLMConfig,
    client: Client,
}

impl LLMClient {
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn provider(&self) -> LLMProvider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_key(&self) -> Result<&str> {
        self.config.api_key.as_deref().ok_or_else(|| {
            let var = self.config.provider.api_key_var().unwrap_or("api_key");
            anyhow!("{} API key not provided (set {} or llm.api_key)", self.config.provider, var)
        })
    }

    async fn post_json(&self, request: reqwest::RequestBuilder, payload: &Value) -> Result<Value> {
        tracing::debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            "sending chat request"
        );
        tracing::trace!(payload = %payload, "request payload");

        let response = request
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.config.provider))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error ({}): {}", self.config.provider, status, error_text));
        }

        let body: Value = response.json().await?;
        tracing::trace!(response = %body, "raw response");
        Ok(body)
    }

    async fn complete_with_gemini(&self, system: &str, user: &str) -> Result<Completion> {
        let api_key = self.api_key()?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com");

        let payload = serde_json::json!({
            "system_instruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_tokens
            }
        });

        let url = format!("{}/v1beta/models/{}:generateContent", base_url, self.config.model);
        let body = self
            .post_json(self.client.post(url).header("x-goog-api-key", api_key), &payload)
            .await?;
        parse_gemini(&body)
    }

    async fn complete_with_openai(&self, system: &str, user: &str) -> Result<Completion> {
        let api_key = self.api_key()?;
        let base_url = self.config.base_url.as_deref().unwrap_or("https://api.openai.com");

        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "max_completion_tokens": self.config.max_tokens,
            "temperature": self.config.temperature
        });

        let request = self
            .client
            .post(format!("{}/v1/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key));
        let body = self.post_json(request, &payload).await?;
        parse_openai(&body)
    }

    async fn complete_with_anthropic(&self, system: &str, user: &str) -> Result<Completion> {
        let api_key = self.api_key()?;
        let base_url = self.config.base_url.as_deref().unwrap_or("https://api.anthropic.com");

        let payload = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }]
        });

        let request = self
            .client
            .post(format!("{}/v1/messages", base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01");
        let body = self.post_json(request, &payload).await?;
        parse_anthropic(&body)
    }

    async fn complete_with_ollama(&self, system: &str, user: &str) -> Result<Completion> {
        let base_url = self.config.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);

        let payload = serde_json::json!({
            "model": self.config.model,
            "system": system,
            "prompt": user,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "num_predict": self.config.max_tokens
            }
        });

        let body = self
            .post_json(self.client.post(format!("{}/api/generate", base_url)), &payload)
            .await?;
        parse_ollama(&body)
    }
}

impl ChatModel for LLMClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        match self.config.provider {
            LLMProvider::Gemini => self.complete_with_gemini(system, user).await,
            LLMProvider::OpenAI => self.complete_with_openai(system, user).await,
            LLMProvider::Anthropic => self.complete_with_anthropic(system, user).await,
            LLMProvider::Ollama => self.complete_with_ollama(system, user).await,
        }
    }
}

fn usage_from(body: &Value, prompt_key: &str, response_key: &str) -> Option<TokenUsage> {
    let prompt_tokens = body.get(prompt_key).and_then(Value::as_u64);
    let response_tokens = body.get(response_key).and_then(Value::as_u64);
    if prompt_tokens.is_none() && response_tokens.is_none() {
        return None;
    }
    Some(TokenUsage {
        prompt_tokens: prompt_tokens.unwrap_or(0),
        response_tokens: response_tokens.unwrap_or(0),
    })
}

fn parse_gemini(body: &Value) -> Result<Completion> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| anyhow!("Invalid response format from Gemini"))?;
    let text = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        text,
        usage: usage_from(&body["usageMetadata"], "promptTokenCount", "candidatesTokenCount"),
    })
}

fn parse_openai(body: &Value) -> Result<Completion> {
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid response format from OpenAI"))?;

    Ok(Completion {
        text: text.to_string(),
        usage: usage_from(&body["usage"], "prompt_tokens", "completion_tokens"),
    })
}

fn parse_anthropic(body: &Value) -> Result<Completion> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic"))?;
    let text = blocks
        .iter()
        .filter(|block| block["type"].as_str().unwrap_or("text") == "text")
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        text,
        usage: usage_from(&body["usage"], "input_tokens", "output_tokens"),
    })
}

fn parse_ollama(body: &Value) -> Result<Completion> {
    let text = body["response"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid response format from Ollama"))?;

    Ok(Completion {
        text: text.to_string(),
        usage: usage_from(body, "prompt_eval_count", "eval_count"),
    })
}
