//! Passthrough provider for OpenAI-compatible upstreams.
//!
//! Covers LM Studio, the tool-transforming Qwen proxy, and the generic
//! fallback for unknown catalog types. The request body is forwarded
//! unchanged and the response (JSON or SSE bytes) is surfaced verbatim.

use crate::http_util::ProviderHttp;
use async_trait::async_trait;
use qwengate_types::{
    ChatRequest, GateError, ProviderConfig, ProviderKind, ProviderModel, now_millis,
    traits::{ChatReply, Provider, Result},
};
use serde_json::{Value, json};
use std::time::Duration;

/// Timeout for the models probe used by listing and health checks.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI-compatible passthrough adapter.
pub struct OpenAiCompatProvider {
    id: String,
    name: String,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<String>,
    models: Vec<ProviderModel>,
    ph: ProviderHttp,
}

impl OpenAiCompatProvider {
    /// Validates `base_url` and builds the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] when `base_url` is absent or not an
    /// http(s) URL.
    pub fn new(
        id: String,
        name: String,
        kind: ProviderKind,
        config: &ProviderConfig,
        http: rquest::Client,
    ) -> Result<Self> {
        let base_url = config
            .get_str("base_url")
            .ok_or_else(|| GateError::Config(format!("provider {id}: base_url is required")))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GateError::Config(format!(
                "provider {id}: base_url must be http(s), got {base_url}"
            )));
        }
        Ok(Self {
            id,
            name,
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.get_str("api_key"),
            models: config.models.clone(),
            ph: ProviderHttp::new(http),
        })
    }

    fn configured_models(&self) -> Value {
        let created = now_millis() / 1000;
        let data: Vec<Value> = self
            .models
            .iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "object": "model",
                    "created": created,
                    "owned_by": self.id
                })
            })
            .collect();
        json!({"object": "list", "data": data})
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind.clone()
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let stream = request.stream;
        let body = request.into_body();

        let mut builder = self
            .ph
            .client()
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        if stream {
            builder = builder.header("accept", "text/event-stream");
        } else {
            builder = builder.header("accept", "application/json");
        }

        self.ph.send_passthrough(builder.json(&body), stream).await
    }

    async fn list_models(&self) -> Result<Value> {
        let mut builder = self
            .ph
            .client()
            .get(format!("{}/models", self.base_url))
            .timeout(PROBE_TIMEOUT);
        if let Some(key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        match self.ph.send(builder).await {
            Ok(resp) => Ok(resp.json().await?),
            Err(e) => {
                // unreachable upstream: fall back to the catalog bindings
                tracing::debug!(provider = %self.id, error = %e, "models probe failed, using catalog list");
                Ok(self.configured_models())
            }
        }
    }

    async fn health_check(&self) -> bool {
        let mut builder = self
            .ph
            .client()
            .get(format!("{}/models", self.base_url))
            .timeout(PROBE_TIMEOUT);
        if let Some(key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }
        self.ph.send(builder).await.is_ok()
    }

    async fn destroy(&self) {}
}
