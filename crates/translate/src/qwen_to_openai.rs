//! Maps Qwen-native responses back to OpenAI chat-completion shapes.
//!
//! The pure per-frame mapping lives here; the live SSE byte-stream adapter
//! that drives it sits in the provider crate next to the HTTP client.

use qwengate_types::now_millis;
use serde_json::{Value, json};

/// What the streaming adapter should do with one parsed native SSE frame.
#[derive(Debug)]
pub enum FrameAction {
    /// `response.created` seen: remember the parent id, forward nothing.
    CaptureParent(String),
    /// A content delta: forward this OpenAI `chat.completion.chunk`.
    Chunk(Value),
    /// `delta.status == "finished"`: forward this terminal chunk, then
    /// `data: [DONE]`, then end the stream.
    Finish(Value),
    /// Keep-alive or unrecognized frame: forward nothing.
    Ignore,
}

/// Maps a native usage object (`input_tokens`/`output_tokens`/`total_tokens`)
/// to OpenAI field names.
#[must_use]
pub fn map_usage(native: &Value) -> Value {
    let prompt = native
        .get("input_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let completion = native
        .get("output_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total = native
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(prompt + completion);
    json!({
        "prompt_tokens": prompt,
        "completion_tokens": completion,
        "total_tokens": total
    })
}

/// An OpenAI content-delta chunk.
#[must_use]
pub fn content_chunk(content: &str, model: &str) -> Value {
    let now = now_millis();
    json!({
        "id": format!("chatcmpl-{now}"),
        "object": "chat.completion.chunk",
        "created": now / 1000,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": {"content": content},
            "finish_reason": null
        }]
    })
}

/// The terminal chunk: empty delta, `finish_reason: "stop"`, usage when the
/// upstream reported one.
#[must_use]
pub fn finish_chunk(model: &str, usage: Option<&Value>) -> Value {
    let now = now_millis();
    let mut chunk = json!({
        "id": format!("chatcmpl-{now}"),
        "object": "chat.completion.chunk",
        "created": now / 1000,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": {},
            "finish_reason": "stop"
        }]
    });
    if let Some(u) = usage {
        chunk["usage"] = map_usage(u);
    }
    chunk
}

/// Extracts the `parent_id` carried by a frame or full response: either
/// top-level or nested under the `response.created` key.
#[must_use]
pub fn extract_parent_id(v: &Value) -> Option<String> {
    if let Some(created) = v.get("response.created") {
        if let Some(p) = created.get("parent_id").and_then(Value::as_str) {
            return Some(p.to_string());
        }
    }
    v.get("parent_id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Classifies one parsed native SSE frame.
#[must_use]
pub fn map_frame(frame: &Value, model: &str) -> FrameAction {
    if let Some(parent) = frame
        .get("response.created")
        .and_then(|c| c.get("parent_id"))
        .and_then(Value::as_str)
    {
        return FrameAction::CaptureParent(parent.to_string());
    }

    let delta = frame.pointer("/choices/0/delta");
    if delta.and_then(|d| d.get("status")).and_then(Value::as_str) == Some("finished") {
        return FrameAction::Finish(finish_chunk(model, frame.get("usage")));
    }
    if let Some(content) = delta
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
    {
        return FrameAction::Chunk(content_chunk(content, model));
    }
    FrameAction::Ignore
}

/// Maps a full (non-streaming) native response to an OpenAI
/// `chat.completion` object. Usage is often absent upstream in this mode;
/// zeroes are emitted rather than failing.
#[must_use]
pub fn non_stream_response(native: &Value, model: &str) -> Value {
    let content = native
        .pointer("/choices/0/message/content")
        .or_else(|| native.pointer("/choices/0/delta/content"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let now = now_millis();
    json!({
        "id": format!("chatcmpl-{now}"),
        "object": "chat.completion",
        "created": now / 1000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": native.get("usage").map_or_else(
            || json!({"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}),
            map_usage,
        )
    })
}
