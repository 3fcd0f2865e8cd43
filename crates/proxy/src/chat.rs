//! Chat completions handler — routes OpenAI-compatible requests to the
//! selected provider and frames the reply as JSON or SSE.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::StreamExt as _;
use qwengate_types::{
    ChatRequest, GateError,
    traits::{ByteStream, ChatReply},
};
use serde_json::json;
use std::sync::Arc;

use crate::{AppState, error::ApiError};

/// Picks the target provider id: explicit request field, then the
/// `active_provider` setting, then the first registered provider.
async fn resolve_provider_id(
    state: &AppState,
    request: &ChatRequest,
) -> Result<String, GateError> {
    if let Some(explicit) = &request.provider {
        return Ok(explicit.clone());
    }
    if let Some(active) = state.settings.load().active_provider.clone() {
        return Ok(active);
    }
    state
        .registry
        .get_all_ids()
        .await
        .into_iter()
        .next()
        .ok_or_else(|| GateError::ProviderNotLoaded("no providers registered".into()))
}

/// Handles `POST /v1/chat/completions`.
///
/// # Errors
///
/// Returns [`ApiError`] when no provider can be resolved or the provider
/// call fails before any bytes were streamed.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError(GateError::Validation(
            "messages must be non-empty".into(),
        )));
    }

    let provider_id = resolve_provider_id(&state, &request).await?;
    let provider = state.registry.get(&provider_id).await?;

    let settings = state.settings.load();
    if settings.logging.log_requests {
        tracing::debug!(provider = %provider_id, body = %request.to_body(), "chat request");
    }
    tracing::info!(
        provider = %provider_id,
        model = %request.model,
        stream = request.stream,
        "chat completion request"
    );

    match provider.chat(request).await {
        Ok(ChatReply::Complete(body)) => {
            if settings.logging.log_responses {
                tracing::debug!(provider = %provider_id, body = %body, "chat response");
            }
            Ok(Json(body).into_response())
        }
        Ok(ChatReply::Stream(stream)) => {
            tracing::debug!(provider = %provider_id, "streaming chat completion");
            let guarded = envelope_on_error(stream);
            let mapped = guarded.map(|r: Result<Bytes, GateError>| {
                r.map_err(|e| std::io::Error::other(e.to_string()))
            });
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .header("cache-control", "no-cache")
                .header("connection", "keep-alive")
                .header("x-accel-buffering", "no")
                .body(Body::from_stream(mapped))
                .expect("valid response"))
        }
        Err(e) => Err(ApiError(e)),
    }
}

/// Once a stream has started, an error must not abort the socket mid-frame:
/// it becomes one SSE error-envelope line followed by `data: [DONE]`.
fn envelope_on_error(inner: ByteStream) -> ByteStream {
    Box::pin(futures_util::stream::unfold(
        (inner, false),
        |(mut inner, done)| async move {
            if done {
                return None;
            }
            match inner.next().await {
                Some(Ok(bytes)) => Some((Ok(bytes), (inner, false))),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "stream failed after start; closing with envelope");
                    let envelope = json!({
                        "error": {
                            "message": e.to_string(),
                            "type": e.error_type(),
                            "code": e.error_code()
                        }
                    });
                    let tail = format!("data: {envelope}\n\ndata: [DONE]\n\n");
                    Some((Ok(Bytes::from(tail)), (inner, true)))
                }
                None => None,
            }
        },
    ))
}
