//! Chat-completions client over HTTP, for OpenAI-compatible providers.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::client::{CompletionClient, CompletionError, CompletionRequest};

/// Minimal chat-completions caller. Works against any provider exposing
/// the OpenAI wire shape (set `base_url` accordingly).
pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpCompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let model = request.model.as_deref().unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(schema) = &request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": "response", "schema": schema },
            });
        }
        body
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.build_body(&request))
            .send()
            .await
            .map_err(|e| CompletionError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Provider {
                message: e.to_string(),
            })?;
        if !status.is_success() {
            return Err(CompletionError::Provider {
                message: format!("status {status}: {body}"),
            });
        }

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CompletionError::Provider {
                message: "response carried no message content".to_string(),
            })
    }
}
