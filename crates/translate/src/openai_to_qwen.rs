//! Builds Qwen-native request payloads from OpenAI-format input.
//!
//! Field names and nesting are wire-significant throughout; the upstream
//! silently misbehaves on near-misses (notably the duplicated
//! `parentId`/`parent_id` pair, which must both be present).

use qwengate_types::now_millis;
use serde_json::{Value, json};
use uuid::Uuid;

fn now_seconds() -> i64 {
    now_millis() / 1000
}

/// The native message object: the last user turn wrapped in Qwen's
/// envelope. `fid` is a fresh UUID v4 per call.
#[must_use]
pub fn build_message(content: &str, role: &str, parent_id: Option<&str>, model: &str) -> Value {
    json!({
        "fid": Uuid::new_v4().to_string(),
        "parentId": parent_id,
        "parent_id": parent_id,
        "childrenIds": [],
        "role": role,
        "content": content,
        "user_action": "chat",
        "files": [],
        "timestamp": now_seconds(),
        "models": [model],
        "chat_type": "t2t",
        "sub_chat_type": "t2t",
        "feature_config": {
            "thinking_enabled": false,
            "output_schema": "phase"
        },
        "extra": {
            "meta": {
                "subChatType": "t2t"
            }
        }
    })
}

/// The outer completion body POSTed to `/api/v2/chat/completions`.
#[must_use]
pub fn build_completion_payload(
    chat_id: &str,
    parent_id: Option<&str>,
    model: &str,
    stream: bool,
    message: Value,
) -> Value {
    json!({
        "stream": stream,
        "incremental_output": true,
        "chat_id": chat_id,
        "chat_mode": "guest",
        "model": model,
        "parent_id": parent_id,
        "messages": [message],
        "timestamp": now_seconds()
    })
}

/// The body POSTed once per new conversation to `/api/v2/chats/new`.
/// Its `timestamp` is in milliseconds, unlike the two payloads above.
#[must_use]
pub fn build_create_chat_payload(title: &str, model: &str) -> Value {
    json!({
        "title": title,
        "models": [model],
        "chat_mode": "guest",
        "chat_type": "t2t",
        "timestamp": now_millis()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_fields() {
        let m = build_message("hello", "user", Some("p-1"), "qwen3-max");
        assert_eq!(m["parentId"], "p-1");
        assert_eq!(m["parent_id"], "p-1");
        assert_eq!(m["childrenIds"], json!([]));
        assert_eq!(m["role"], "user");
        assert_eq!(m["content"], "hello");
        assert_eq!(m["user_action"], "chat");
        assert_eq!(m["files"], json!([]));
        assert_eq!(m["models"], json!(["qwen3-max"]));
        assert_eq!(m["chat_type"], "t2t");
        assert_eq!(m["sub_chat_type"], "t2t");
        assert_eq!(m["feature_config"]["thinking_enabled"], false);
        assert_eq!(m["feature_config"]["output_schema"], "phase");
        assert_eq!(m["extra"]["meta"]["subChatType"], "t2t");
    }

    #[test]
    fn test_message_fid_is_uuid_and_fresh() {
        let a = build_message("x", "user", None, "m");
        let b = build_message("x", "user", None, "m");
        let fid_a = a["fid"].as_str().unwrap();
        let fid_b = b["fid"].as_str().unwrap();
        assert_ne!(fid_a, fid_b);
        assert!(uuid::Uuid::parse_str(fid_a).is_ok());
    }

    #[test]
    fn test_message_null_parent_on_first_turn() {
        let m = build_message("hi", "user", None, "m");
        assert!(m["parentId"].is_null());
        assert!(m["parent_id"].is_null());
    }

    #[test]
    fn test_message_timestamp_is_seconds() {
        let m = build_message("hi", "user", None, "m");
        let ts = m["timestamp"].as_i64().unwrap();
        // seconds-scale epoch, not milliseconds
        assert!(ts > 1_600_000_000);
        assert!(ts < 100_000_000_000);
    }

    #[test]
    fn test_completion_payload_fields() {
        let msg = build_message("hi", "user", Some("p-9"), "qwen3-max");
        let p = build_completion_payload("chat-7", Some("p-9"), "qwen3-max", true, msg);
        assert_eq!(p["stream"], true);
        assert_eq!(p["incremental_output"], true);
        assert_eq!(p["chat_id"], "chat-7");
        assert_eq!(p["chat_mode"], "guest");
        assert_eq!(p["model"], "qwen3-max");
        assert_eq!(p["parent_id"], "p-9");
        assert_eq!(p["messages"].as_array().unwrap().len(), 1);
        assert_eq!(p["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_completion_payload_non_stream() {
        let msg = build_message("hi", "user", None, "m");
        let p = build_completion_payload("c", None, "m", false, msg);
        assert_eq!(p["stream"], false);
        assert!(p["parent_id"].is_null());
    }

    #[test]
    fn test_create_chat_payload_fields() {
        let p = build_create_chat_payload("Conversation 49f68a5c", "qwen3-max");
        assert_eq!(p["title"], "Conversation 49f68a5c");
        assert_eq!(p["models"], json!(["qwen3-max"]));
        assert_eq!(p["chat_mode"], "guest");
        assert_eq!(p["chat_type"], "t2t");
    }

    #[test]
    fn test_create_chat_timestamp_is_millis() {
        let p = build_create_chat_payload("t", "m");
        let ts = p["timestamp"].as_i64().unwrap();
        // milliseconds-scale epoch
        assert!(ts > 1_600_000_000_000);
    }
}
