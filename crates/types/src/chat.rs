//! Strongly-typed OpenAI-compatible chat completion request.
//!
//! Replaces raw `serde_json::Value` usage at the API boundary, providing
//! compile-time guarantees for common fields (`model`, `stream`, `messages`)
//! while preserving forward-compatibility through a catch-all extra map.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A strongly-typed OpenAI-compatible chat completion request body.
///
/// Common fields are deserialized into typed fields; all remaining fields
/// (e.g., `temperature`, `tools`, `max_tokens`) are captured in [`extra`].
///
/// The optional `provider` field is qwengate's per-request routing override;
/// it is stripped before the body is forwarded upstream.
///
/// [`extra`]: ChatRequest::extra
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model identifier (e.g., `"qwen3-max"`). Providers may substitute
    /// their configured default when empty.
    #[serde(default)]
    pub model: String,
    /// Whether to use streaming SSE mode.
    #[serde(default)]
    pub stream: bool,
    /// The conversation messages.
    pub messages: Vec<Value>,
    /// Explicit target provider id, overriding the active-provider setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// All remaining fields not captured above.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ChatRequest {
    /// Content of the first `role: "user"` message, used as the
    /// conversation identity for stateful upstreams.
    #[must_use]
    pub fn first_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
    }

    /// Content of the last `role: "user"` message — the turn actually sent
    /// to a stateful upstream that keeps its own history.
    #[must_use]
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
    }

    /// Reconstructs the full request body as a `serde_json::Value`.
    ///
    /// The returned `Value` is an object containing `model`, `stream`,
    /// `messages`, plus all extra fields. The routing-only `provider` field
    /// is intentionally omitted — upstreams never see it.
    #[must_use]
    pub fn into_body(self) -> Value {
        let mut map = serde_json::Map::with_capacity(self.extra.len() + 3);
        for (k, v) in self.extra {
            map.insert(k, v);
        }
        map.insert("model".into(), Value::String(self.model));
        map.insert("stream".into(), Value::Bool(self.stream));
        map.insert("messages".into(), Value::Array(self.messages));
        Value::Object(map)
    }

    /// Returns a `serde_json::Value` view of the full body without consuming self.
    #[must_use]
    pub fn to_body(&self) -> Value {
        self.clone().into_body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal() {
        let v = json!({
            "model": "qwen3-max",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.model, "qwen3-max");
        assert!(!req.stream);
        assert_eq!(req.messages.len(), 1);
        assert!(req.provider.is_none());
        assert!(req.extra.is_empty());
    }

    #[test]
    fn test_deserialize_with_stream_and_provider() {
        let v = json!({
            "model": "qwen3-max",
            "stream": true,
            "provider": "local-lm",
            "messages": []
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert!(req.stream);
        assert_eq!(req.provider.as_deref(), Some("local-lm"));
    }

    #[test]
    fn test_extra_fields_preserved() {
        let v = json!({
            "model": "m",
            "messages": [],
            "temperature": 0.7,
            "max_tokens": 1024,
            "tools": [{"type": "function"}]
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.extra.len(), 3);
        assert_eq!(req.extra["temperature"], json!(0.7));
        assert_eq!(req.extra["max_tokens"], json!(1024));
    }

    #[test]
    fn test_first_user_content_skips_system() {
        let v = json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": "hi"},
                {"role": "user", "content": "again"}
            ]
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert_eq!(req.first_user_content(), Some("hello"));
        assert_eq!(req.last_user_content(), Some("again"));
    }

    #[test]
    fn test_first_user_content_none_without_user_turn() {
        let v = json!({"model": "m", "messages": [{"role": "system", "content": "x"}]});
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert!(req.first_user_content().is_none());
    }

    #[test]
    fn test_into_body_strips_provider() {
        let v = json!({
            "model": "qwen3-max",
            "stream": true,
            "provider": "local-lm",
            "messages": [{"role": "user", "content": "test"}],
            "temperature": 0.5,
        });
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        let body = req.into_body();
        assert_eq!(body["model"], "qwen3-max");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.5);
        assert!(body.get("provider").is_none());
    }

    #[test]
    fn test_stream_defaults_to_false() {
        let v = json!({"model": "m", "messages": []});
        let req: ChatRequest = serde_json::from_value(v).unwrap();
        assert!(!req.stream);
    }
}
