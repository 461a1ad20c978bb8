use super::ChatBackend;
use crate::config::BackendConfig;
use crate::sse::{self, SseData};
use crate::stream::{BackendStream, DEFAULT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use relay_core::{ChatMessage, RelayError, RelayResult, Role};

/// Google Gemini backend using `streamGenerateContent` with SSE framing.
///
/// Gemini has no system or assistant roles in its chat history; assistant
/// turns become `model` turns and everything else becomes `user`. The final
/// message is always sent as the new user turn.
pub struct GeminiBackend {
    config: BackendConfig,
    api_key: Option<String>,
    http: reqwest::Client,
    channel_capacity: usize,
}

impl GeminiBackend {
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
        let mut contents: Vec<serde_json::Value> = Vec::with_capacity(messages.len());

        if let Some((last, history)) = messages.split_last() {
            for m in history {
                let role = match m.role {
                    Role::Assistant => "model",
                    Role::User | Role::System => "user",
                };
                contents.push(serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }],
                }));
            }
            contents.push(serde_json::json!({
                "role": "user",
                "parts": [{ "text": last.content }],
            }));
        }

        let mut body = serde_json::json!({ "contents": contents });

        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = self.config.max_tokens {
            generation.insert("maxOutputTokens".into(), max_tokens.into());
        }
        if let Some(temperature) = self.config.temperature {
            generation.insert("temperature".into(), temperature.into());
        }
        if !generation.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation);
        }

        body
    }

    fn fail(&self, message: impl Into<String>) -> RelayError {
        RelayError::backend(&self.config.name, message)
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> RelayResult<BackendStream> {
        let Some(api_key) = &self.api_key else {
            return Err(self.fail(format!("missing API key ({})", self.config.api_key_env)));
        };

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url(),
            self.config.model_id
        );

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
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

/// Interpret one `data:` payload of a `streamGenerateContent` response.
pub fn parse_chunk(data: &str) -> RelayResult<SseData> {
    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(SseData::Skip),
    };

    if let Some(message) = sse::error_message(&event) {
        return Err(RelayError::Http(message));
    }

    if let Some(reason) = event["promptFeedback"]["blockReason"].as_str() {
        return Err(RelayError::Http(format!("prompt blocked: {reason}")));
    }

    let text: String = event["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        Ok(SseData::Skip)
    } else {
        Ok(SseData::Fragment(text))
    }
}
