//! Direct Qwen chat adapter — OpenAI semantics over a stateful upstream.
//!
//! The upstream keeps conversational state server-side: each conversation
//! is a "chat" created once, and every turn threads a `parent_id` pointer
//! to the previous assistant turn. This provider derives a deterministic
//! conversation id from the first user message (MD5), keeps the
//! `chat_id`/`parent_id` pair in its own session manager, and translates
//! both wire directions.

use crate::qwen_http::QwenClient;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt as _, stream::try_unfold};
use qwengate_session::{SessionManager, generate_session_id};
use qwengate_store::Store;
use qwengate_translate::{
    FrameAction, build_completion_payload, build_message, extract_parent_id, map_frame,
    non_stream_response,
};
use qwengate_types::{
    ChatRequest, GateError, ProviderConfig, ProviderKind, ProviderModel, QwenCredential,
    now_millis,
    traits::{ByteStream, ChatReply, Provider, Result},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the request nor the catalog names one.
const FALLBACK_MODEL: &str = "qwen3-max";

/// Direct adapter for the Qwen chat service.
pub struct QwenDirectProvider {
    id: String,
    name: String,
    client: QwenClient,
    sessions: Arc<SessionManager>,
    store: Arc<Store>,
    models: Vec<ProviderModel>,
    default_model: String,
}

impl QwenDirectProvider {
    /// Builds the adapter and starts its session sweep. The factory has
    /// already verified that a credential record exists.
    pub fn new(
        id: String,
        name: String,
        config: &ProviderConfig,
        store: Arc<Store>,
        http: rquest::Client,
    ) -> Self {
        let ttl = config
            .get_str("session_ttl_secs")
            .and_then(|s| s.parse().ok())
            .map_or(qwengate_session::DEFAULT_TTL, Duration::from_secs);
        let sweep = config
            .get_str("session_sweep_secs")
            .and_then(|s| s.parse().ok())
            .map_or(qwengate_session::DEFAULT_CLEANUP_INTERVAL, Duration::from_secs);
        let sessions = Arc::new(SessionManager::with_config(ttl, sweep));
        sessions.start_cleanup();

        let client = QwenClient::new(http, Arc::clone(&store), config.get_str("base_url"));
        let default_model = config
            .default_model
            .clone()
            .or_else(|| config.get_str("default_model"))
            .unwrap_or_else(|| FALLBACK_MODEL.to_string());

        Self {
            id,
            name,
            client,
            sessions,
            store,
            models: config.models.clone(),
            default_model,
        }
    }

    /// The adapter's session manager (exposed for metrics and tests).
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Creates an upstream chat for a new conversation and records the
    /// session. The title carries the first eight hex chars of the id.
    async fn create_conversation(&self, conv_id: &str, model: &str) -> Result<String> {
        let title = format!("Conversation {}", &conv_id[..8]);
        let chat_id = self.client.create_chat(&title, model).await?;
        tracing::info!(conversation = %conv_id, chat_id = %chat_id, "created upstream chat");
        self.sessions.create(conv_id, Some(chat_id.clone()));
        Ok(chat_id)
    }

    fn finish_reply(&self, reply: ChatReply, conv_id: String, model: &str) -> ChatReply {
        match reply {
            ChatReply::Stream(inner) => ChatReply::Stream(translate_qwen_sse(
                inner,
                Arc::clone(&self.sessions),
                conv_id,
                model.to_string(),
            )),
            ChatReply::Complete(native) => {
                if let Some(parent) = extract_parent_id(&native) {
                    self.sessions.update_parent_id(&conv_id, &parent);
                }
                ChatReply::Complete(non_stream_response(&native, model))
            }
        }
    }
}

#[async_trait]
impl Provider for QwenDirectProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::QwenDirect
    }

    fn base_url(&self) -> Option<&str> {
        Some(self.client.base_url())
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let cred = self.store.credential().await?;
        if !cred.as_ref().is_some_and(QwenCredential::is_valid) {
            return Err(GateError::CredentialsMissing);
        }

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };
        let first = request.first_user_content().ok_or_else(|| {
            GateError::Validation("chat requires at least one user message".into())
        })?;
        let conv_id = generate_session_id(first)?;
        let content = request.last_user_content().unwrap_or(first).to_string();
        let stream = request.stream;

        let (chat_id, parent_id) = match self.sessions.get(&conv_id) {
            Some(session) if session.chat_id.is_some() => {
                (session.chat_id.unwrap_or_default(), session.parent_id)
            }
            _ => (self.create_conversation(&conv_id, &model).await?, None),
        };

        let message = build_message(&content, "user", parent_id.as_deref(), &model);
        let payload =
            build_completion_payload(&chat_id, parent_id.as_deref(), &model, stream, message);

        match self.client.send_message(&chat_id, &payload, stream).await {
            Ok(reply) => Ok(self.finish_reply(reply, conv_id, &model)),
            Err(GateError::ChatNotFound(_)) => {
                // Stale session → chat_id mapping: recreate once, then surface.
                tracing::warn!(conversation = %conv_id, "stale chat mapping, recreating upstream chat");
                self.sessions.delete(&conv_id);
                let chat_id = self.create_conversation(&conv_id, &model).await?;
                let message = build_message(&content, "user", None, &model);
                let payload = build_completion_payload(&chat_id, None, &model, stream, message);
                let reply = self.client.send_message(&chat_id, &payload, stream).await?;
                Ok(self.finish_reply(reply, conv_id, &model))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_models(&self) -> Result<Value> {
        let created = now_millis() / 1000;
        let data: Vec<Value> = if self.models.is_empty() {
            vec![json!({
                "id": self.default_model,
                "object": "model",
                "created": created,
                "owned_by": "qwen"
            })]
        } else {
            self.models
                .iter()
                .map(|m| {
                    json!({
                        "id": m.id,
                        "object": "model",
                        "created": created,
                        "owned_by": "qwen"
                    })
                })
                .collect()
        };
        Ok(json!({"object": "list", "data": data}))
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }

    async fn destroy(&self) {
        self.sessions.shutdown();
    }
}

/// Defers the session `parent_id` update until the stream truly ends.
///
/// Commits when `[DONE]` is written, or on drop when the upstream had
/// already finished normally (client cancelled between the terminal chunk
/// and `[DONE]`). A stream that dies before the finish frame leaves the
/// session untouched so the next turn can recover.
struct ParentCommit {
    sessions: Arc<SessionManager>,
    session_id: String,
    parent: Option<String>,
    finished: bool,
    committed: bool,
}

impl ParentCommit {
    fn commit(&mut self) {
        if self.finished && !self.committed {
            if let Some(parent) = &self.parent {
                self.sessions.update_parent_id(&self.session_id, parent);
            }
            self.committed = true;
        }
    }
}

impl Drop for ParentCommit {
    fn drop(&mut self) {
        self.commit();
    }
}

/// Wraps the raw native SSE `ByteStream` and emits OpenAI chat-completion
/// chunk SSE, line by line.
///
/// Native frames handled:
/// - `response.created`          → capture `parent_id`; forward nothing
/// - `choices[0].delta.content`  → emit a `chat.completion.chunk`
/// - `delta.status == "finished"`→ terminal chunk (+usage), then `[DONE]`
/// - upstream error mid-stream   → one error-envelope line, then `[DONE]`
/// - upstream EOF without finish → `[DONE]` (partial content stands)
pub(crate) fn translate_qwen_sse(
    inner: ByteStream,
    sessions: Arc<SessionManager>,
    session_id: String,
    model: String,
) -> ByteStream {
    struct State {
        inner: ByteStream,
        buf: Vec<u8>,
        model: String,
        commit: ParentCommit,
        /// `[DONE]` is owed as the next emission.
        pending_done: bool,
        done: bool,
    }

    Box::pin(try_unfold(
        State {
            inner,
            buf: Vec::new(),
            model,
            commit: ParentCommit {
                sessions,
                session_id,
                parent: None,
                finished: false,
                committed: false,
            },
            pending_done: false,
            done: false,
        },
        |mut s| async move {
            loop {
                if s.done {
                    return Ok(None);
                }
                if s.pending_done {
                    s.done = true;
                    s.commit.commit();
                    return Ok(Some((Bytes::from("data: [DONE]\n\n"), s)));
                }

                if let Some(nl) = s.buf.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = s.buf.drain(..=nl).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\r', '\n']);

                    if let Some(data) = line.strip_prefix("data: ")
                        && let Ok(frame) = serde_json::from_str::<Value>(data)
                    {
                        match map_frame(&frame, &s.model) {
                            FrameAction::CaptureParent(parent) => {
                                // only the first response.created counts
                                if s.commit.parent.is_none() {
                                    s.commit.parent = Some(parent);
                                }
                            }
                            FrameAction::Chunk(chunk) => {
                                return Ok(Some((
                                    Bytes::from(format!("data: {chunk}\n\n")),
                                    s,
                                )));
                            }
                            FrameAction::Finish(chunk) => {
                                s.commit.finished = true;
                                s.pending_done = true;
                                return Ok(Some((
                                    Bytes::from(format!("data: {chunk}\n\n")),
                                    s,
                                )));
                            }
                            FrameAction::Ignore => {}
                        }
                    }
                    continue;
                }

                match s.inner.next().await {
                    Some(Ok(bytes)) => s.buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "upstream stream failed mid-flight");
                        let envelope = json!({
                            "error": {
                                "message": e.to_string(),
                                "type": e.error_type(),
                                "code": e.error_code()
                            }
                        });
                        s.pending_done = true;
                        return Ok(Some((
                            Bytes::from(format!("data: {envelope}\n\n")),
                            s,
                        )));
                    }
                    None => s.pending_done = true,
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt as _, TryStreamExt as _};

    fn fake_stream(chunks: Vec<&str>) -> ByteStream {
        let items: Vec<Result<Bytes>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        Box::pin(tokio_stream::iter(items))
    }

    async fn collect(stream: ByteStream) -> Vec<String> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks
            .into_iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect()
    }

    fn manager_with(conv: &str) -> Arc<SessionManager> {
        let sm = Arc::new(SessionManager::new());
        sm.create(conv, Some("chat-1".into()));
        sm
    }

    #[tokio::test]
    async fn test_streaming_happy_path() {
        let sm = manager_with("conv");
        let inner = fake_stream(vec![
            "data: {\"response.created\":{\"parent_id\":\"abc\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"status\":\"finished\"}}],\"usage\":{\"input_tokens\":5,\"output_tokens\":2,\"total_tokens\":7}}\n\n",
        ]);
        let out = collect(translate_qwen_sse(
            inner,
            Arc::clone(&sm),
            "conv".into(),
            "qwen3-max".into(),
        ))
        .await;

        assert_eq!(out.len(), 4);
        let first: Value = serde_json::from_str(out[0].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
        let second: Value = serde_json::from_str(out[1].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(second["choices"][0]["delta"]["content"], "lo");
        let fin: Value = serde_json::from_str(out[2].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(fin["choices"][0]["finish_reason"], "stop");
        assert_eq!(fin["usage"]["prompt_tokens"], 5);
        assert_eq!(fin["usage"]["completion_tokens"], 2);
        assert_eq!(out[3], "data: [DONE]\n\n");

        let session = sm.get("conv").unwrap();
        assert_eq!(session.parent_id.as_deref(), Some("abc"));
        assert_eq!(session.message_count, 1);
    }

    #[tokio::test]
    async fn test_streaming_frames_split_across_chunks() {
        let sm = manager_with("conv");
        let inner = fake_stream(vec![
            "data: {\"choices\":[{\"delta\"",
            ":{\"content\":\"Hi\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"status\":\"finished\"}}]}\n\n",
        ]);
        let out = collect(translate_qwen_sse(
            inner,
            sm,
            "conv".into(),
            "m".into(),
        ))
        .await;
        assert_eq!(out.len(), 3);
        assert!(out[0].contains("\"Hi\""));
        assert_eq!(out[2], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_streaming_eof_without_finish_still_done() {
        let sm = manager_with("conv");
        let inner = fake_stream(vec![
            "data: {\"response.created\":{\"parent_id\":\"abc\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
        ]);
        let out = collect(translate_qwen_sse(
            inner,
            Arc::clone(&sm),
            "conv".into(),
            "m".into(),
        ))
        .await;
        assert_eq!(out.last().unwrap(), "data: [DONE]\n\n");
        // upstream never finished: the parent pointer must not move
        assert!(sm.get("conv").unwrap().parent_id.is_none());
    }

    #[tokio::test]
    async fn test_streaming_error_mid_flight_emits_envelope_then_done() {
        let sm = manager_with("conv");
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from(
                "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
            )),
            Err(GateError::Network("connection reset".into())),
        ];
        let inner: ByteStream = Box::pin(tokio_stream::iter(items));
        let out = collect(translate_qwen_sse(inner, sm, "conv".into(), "m".into())).await;
        assert_eq!(out.len(), 3);
        let envelope: Value =
            serde_json::from_str(out[1].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(envelope["error"]["code"], "upstream_network_error");
        assert_eq!(out[2], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_cancel_after_finish_still_commits_parent() {
        let sm = manager_with("conv");
        let inner = fake_stream(vec![
            "data: {\"response.created\":{\"parent_id\":\"abc\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"status\":\"finished\"}}]}\n\n",
        ]);
        let mut stream =
            translate_qwen_sse(inner, Arc::clone(&sm), "conv".into(), "m".into());
        // pull the terminal chunk, then drop before [DONE]
        let _ = stream.next().await.unwrap().unwrap();
        drop(stream);
        assert_eq!(sm.get("conv").unwrap().parent_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_cancel_before_finish_leaves_session() {
        let sm = manager_with("conv");
        let inner = fake_stream(vec![
            "data: {\"response.created\":{\"parent_id\":\"abc\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"status\":\"finished\"}}]}\n\n",
        ]);
        let mut stream =
            translate_qwen_sse(inner, Arc::clone(&sm), "conv".into(), "m".into());
        let _ = stream.next().await.unwrap().unwrap(); // the "x" chunk
        drop(stream);
        assert!(sm.get("conv").unwrap().parent_id.is_none());
    }

    #[tokio::test]
    async fn test_first_response_created_wins() {
        let sm = manager_with("conv");
        let inner = fake_stream(vec![
            "data: {\"response.created\":{\"parent_id\":\"first\"}}\n\n",
            "data: {\"response.created\":{\"parent_id\":\"second\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"status\":\"finished\"}}]}\n\n",
        ]);
        let _ = collect(translate_qwen_sse(
            inner,
            Arc::clone(&sm),
            "conv".into(),
            "m".into(),
        ))
        .await;
        assert_eq!(sm.get("conv").unwrap().parent_id.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_chat_without_credentials_fails_fast() {
        let store = Arc::new(Store::new("sqlite::memory:").await.unwrap());
        let provider = QwenDirectProvider::new(
            "qd".into(),
            "Qwen Direct".into(),
            &ProviderConfig::default(),
            store,
            rquest::Client::new(),
        );
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "qwen3-max",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        let err = provider.chat(req).await.unwrap_err();
        assert!(matches!(err, GateError::CredentialsMissing));
        provider.destroy().await;
    }

    #[tokio::test]
    async fn test_chat_requires_user_message() {
        let store = Arc::new(Store::new("sqlite::memory:").await.unwrap());
        store.set_credential("tok", "c=1", None).await.unwrap();
        let provider = QwenDirectProvider::new(
            "qd".into(),
            "Qwen Direct".into(),
            &ProviderConfig::default(),
            store,
            rquest::Client::new(),
        );
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "qwen3-max",
            "messages": [{"role": "system", "content": "be terse"}]
        }))
        .unwrap();
        let err = provider.chat(req).await.unwrap_err();
        assert!(matches!(err, GateError::Validation(_)));
        provider.destroy().await;
    }

    #[tokio::test]
    async fn test_list_models_openai_shape() {
        let store = Arc::new(Store::new("sqlite::memory:").await.unwrap());
        let mut config = ProviderConfig::default();
        config.models = vec![
            ProviderModel {
                id: "qwen3-max".into(),
                name: "Qwen3 Max".into(),
                description: None,
                capabilities: vec!["chat".into()],
                is_default: true,
            },
            ProviderModel {
                id: "qwen3-coder".into(),
                name: "Qwen3 Coder".into(),
                description: None,
                capabilities: vec![],
                is_default: false,
            },
        ];
        let provider = QwenDirectProvider::new(
            "qd".into(),
            "Qwen Direct".into(),
            &config,
            store,
            rquest::Client::new(),
        );
        let list = provider.list_models().await.unwrap();
        assert_eq!(list["object"], "list");
        assert_eq!(list["data"].as_array().unwrap().len(), 2);
        assert_eq!(list["data"][0]["id"], "qwen3-max");
        assert_eq!(list["data"][0]["owned_by"], "qwen");
        assert_eq!(list["data"][0]["object"], "model");
        provider.destroy().await;
    }

    #[tokio::test]
    async fn test_list_models_falls_back_to_default() {
        let store = Arc::new(Store::new("sqlite::memory:").await.unwrap());
        let provider = QwenDirectProvider::new(
            "qd".into(),
            "Qwen Direct".into(),
            &ProviderConfig::default(),
            store,
            rquest::Client::new(),
        );
        let list = provider.list_models().await.unwrap();
        assert_eq!(list["data"][0]["id"], "qwen3-max");
        provider.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_stops_sweep_and_clears() {
        let store = Arc::new(Store::new("sqlite::memory:").await.unwrap());
        let provider = QwenDirectProvider::new(
            "qd".into(),
            "Qwen Direct".into(),
            &ProviderConfig::default(),
            store,
            rquest::Client::new(),
        );
        provider.sessions().create("abc", None);
        provider.destroy().await;
        assert_eq!(provider.sessions().metrics().active, 0);
    }
}
