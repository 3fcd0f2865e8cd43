//! Core types and traits for the qwengate workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! qwengate router, including the error type, the typed OpenAI request, the
//! provider catalog types, the Qwen credential record, and the `Provider`
//! trait each adapter implements.

pub mod chat;
pub mod error;
pub mod provider;
pub mod traits;

pub use chat::ChatRequest;
pub use error::GateError;
pub use provider::{
    ProviderConfig, ProviderKind, ProviderModel, ProviderRecord, QWEN_USER_AGENT, QwenCredential,
};
pub use traits::{ByteStream, ChatReply, Provider};

/// Milliseconds since the epoch — the workspace-wide timestamp unit
/// (credential `expires_at` is the deliberate seconds-based exception).
#[must_use]
pub fn now_millis() -> i64 {
    i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(std::time::Duration::ZERO)
            .as_millis(),
    )
    .unwrap_or(i64::MAX)
}
