//! Shared HTTP utilities for provider implementations.
//!
//! Eliminates duplicated send → status-check → stream-or-complete logic
//! across the passthrough providers and the Qwen client.

use futures_util::StreamExt as _;
use qwengate_types::{
    GateError,
    traits::{ByteStream, ChatReply, Result},
};
use rquest::{Client, RequestBuilder};
use serde_json::Value;

/// Maps a non-success status to the generic upstream error taxonomy.
/// The Qwen client layers its own auth/404-aware classification on top.
#[must_use]
pub fn status_error(status: u16, body: String) -> GateError {
    match status {
        429 => GateError::RateLimited { status },
        s if s >= 500 => GateError::UpstreamServer { status, body },
        _ => GateError::UpstreamClient { status, body },
    }
}

/// Shared HTTP helper that providers use to send requests and handle the
/// common response patterns (status check, stream vs complete).
#[derive(Clone)]
pub struct ProviderHttp {
    http: Client,
}

impl ProviderHttp {
    /// Creates a new helper wrapping the given HTTP client.
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Returns a reference to the inner HTTP client for building requests.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.http
    }

    /// Sends a request and checks for success status.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Network`] on transport failure, or the status
    /// classification from [`status_error`] on a non-2xx response.
    pub async fn send(&self, builder: RequestBuilder) -> Result<rquest::Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(status_error(status.as_u16(), text))
        }
    }

    /// Sends a request and returns a [`ChatReply`] for OpenAI-passthrough
    /// providers (those that don't need response translation).
    ///
    /// If `stream` is true, wraps the bytes stream; otherwise parses JSON.
    pub async fn send_passthrough(
        &self,
        builder: RequestBuilder,
        stream: bool,
    ) -> Result<ChatReply> {
        let resp = self.send(builder).await?;
        if stream {
            Ok(ChatReply::Stream(Self::byte_stream(resp)))
        } else {
            let json: Value = resp.json().await?;
            Ok(ChatReply::Complete(json))
        }
    }

    /// Converts an `rquest::Response` into a `ByteStream`.
    #[must_use]
    pub fn byte_stream(resp: rquest::Response) -> ByteStream {
        Box::pin(resp.bytes_stream().map(|r| r.map_err(GateError::from)))
    }
}
