use super::ChatBackend;
use crate::config::BackendConfig;
use crate::sse::{self, SseData};
use crate::stream::{BackendStream, DEFAULT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use relay_core::{ChatMessage, RelayError, RelayResult};

/// OpenAI-compatible chat completions backend.
///
/// Works with Groq, Cerebras, OpenAI, and any other provider that implements
/// the OpenAI `/v1/chat/completions` streaming API.
pub struct OpenAiCompatBackend {
    config: BackendConfig,
    api_key: Option<String>,
    http: reqwest::Client,
    channel_capacity: usize,
}

impl OpenAiCompatBackend {
    pub fn new(config: BackendConfig) -> Self {
        let api_key = config.resolve_api_key();
        Self {
            config,
            api_key,
            http: reqwest::Client::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    fn build_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "messages": messages,
            "stream": true,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = temperature.into();
        }
        body
    }

    fn fail(&self, message: impl Into<String>) -> RelayError {
        RelayError::backend(&self.config.name, message)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> RelayResult<BackendStream> {
        let Some(api_key) = &self.api_key else {
            return Err(self.fail(format!("missing API key ({})", self.config.api_key_env)));
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.build_body(messages))
            .send()
            .await
            .map_err(|e| self.fail(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(self.fail(format!("API error {status}: {error_body}")));
        }

        let byte_stream = resp.bytes_stream();
        Ok(BackendStream::spawn(self.channel_capacity, move |tx| {
            sse::pump(byte_stream, tx, parse_chunk)
        }))
    }
}

/// Interpret one `data:` payload of a chat completions stream.
pub fn parse_chunk(data: &str) -> RelayResult<SseData> {
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }

    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(SseData::Skip),
    };

    if let Some(message) = sse::error_message(&event) {
        return Err(RelayError::Http(message));
    }

    match event["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(SseData::Fragment(content.to_string())),
        _ => Ok(SseData::Skip),
    }
}
