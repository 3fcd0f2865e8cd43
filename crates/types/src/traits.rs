//! Async traits shared across all qwengate crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `qwengate-types`, not on each other.

use crate::{ChatRequest, GateError, ProviderKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GateError>;

/// A pinned, sendable stream of SSE byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// The response produced by a [`Provider`] chat call.
pub enum ChatReply {
    /// A complete, non-streaming OpenAI-format JSON response.
    Complete(Value),
    /// A streaming SSE byte stream, terminated by `data: [DONE]`.
    Stream(ByteStream),
}

/// A configured upstream adapter exposing the unified chat surface.
///
/// One instance per catalog row; the registry exclusively owns instances
/// and hands out `Arc` clones to the router. There is no directly
/// constructible base — only the concrete variants implement this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The catalog id this instance was built from.
    fn id(&self) -> &str;
    /// Display name.
    fn name(&self) -> &str;
    /// The concrete adapter class.
    fn kind(&self) -> ProviderKind;

    /// Execute a chat completion. `request.stream` governs the reply shape.
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply>;

    /// OpenAI-format model list (`{object: "list", data: [...]}`).
    async fn list_models(&self) -> Result<Value>;

    /// Liveness probe; `false` means degraded, not unregistered.
    async fn health_check(&self) -> bool;

    /// Release owned resources (background tasks, session state). Called by
    /// the registry on unregister/reload/clear; must be idempotent.
    async fn destroy(&self);

    /// Upstream base URL, when the variant has one (used by `/health`).
    fn base_url(&self) -> Option<&str> {
        None
    }
}
