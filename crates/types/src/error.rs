//! Unified error type for the qwengate workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across qwengate crates.
#[derive(Debug, Error)]
pub enum GateError {
    /// No usable Qwen credential record is stored.
    #[error("Qwen credentials not found or expired")]
    CredentialsMissing,

    /// A credential record exists but its expiry has passed.
    #[error("Qwen credentials expired")]
    CredentialsExpired,

    /// The upstream rejected the request with 429.
    #[error("upstream rate limited (status {status})")]
    RateLimited { status: u16 },

    /// The upstream failed with a 5xx status.
    #[error("upstream server error: status={status}, body={body}")]
    UpstreamServer { status: u16, body: String },

    /// The upstream rejected the request with a non-404 4xx status.
    #[error("upstream client error: status={status}, body={body}")]
    UpstreamClient { status: u16, body: String },

    /// The native chat id no longer exists upstream (404).
    #[error("chat not found upstream: {0}")]
    ChatNotFound(String),

    /// Connection refused, timeout, or DNS failure reaching the upstream.
    #[error("network error: {0}")]
    Network(String),

    /// Provider configuration failed validation at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// The catalog has no row for the requested provider id.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// The provider exists in the catalog but is not registered.
    #[error("provider not loaded: {0}")]
    ProviderNotLoaded(String),

    /// The provider is present but disabled in the catalog.
    #[error("provider disabled: {0}")]
    ProviderDisabled(String),

    /// Adapter-internal: no session entry for the conversation id.
    #[error("session not found: {0}")]
    SessionMissing(String),

    /// Malformed OpenAI-format request.
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent storage (`SQLite`) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Catch-all internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Whether the Qwen client's backoff loop may retry after this error.
    ///
    /// Credential and 4xx errors are terminal; rate limits, 5xx, and
    /// transport failures are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::UpstreamServer { .. } | Self::Network(_)
        )
    }

    /// The `error.type` field of the OpenAI error envelope.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ProviderNotFound(_) | Self::ChatNotFound(_) => "not_found_error",
            Self::ProviderDisabled(_) => "conflict_error",
            Self::ProviderNotLoaded(_) => "provider_not_loaded_error",
            _ => "server_error",
        }
    }

    /// The `error.code` field of the OpenAI error envelope.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CredentialsMissing => "credentials_missing",
            Self::CredentialsExpired => "credentials_expired",
            Self::RateLimited { .. } => "upstream_rate_limited",
            Self::UpstreamServer { .. } => "upstream_server_error",
            Self::UpstreamClient { .. } => "upstream_client_error",
            Self::ChatNotFound(_) => "chat_not_found",
            Self::Network(_) => "upstream_network_error",
            Self::Config(_) => "config_invalid",
            Self::ProviderNotFound(_) => "provider_not_found",
            Self::ProviderNotLoaded(_) => "provider_not_loaded",
            Self::ProviderDisabled(_) => "provider_disabled",
            Self::SessionMissing(_) => "session_missing",
            Self::Validation(_) => "validation_error",
            Self::Serialization(_) => "serialization_error",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "server_error",
        }
    }

    /// The HTTP status a front-end should pair with this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::ProviderNotFound(_) | Self::ChatNotFound(_) => 404,
            Self::ProviderDisabled(_) => 409,
            Self::RateLimited { .. } => 429,
            Self::ProviderNotLoaded(_) => 503,
            Self::UpstreamServer { .. } | Self::UpstreamClient { .. } | Self::Network(_) => 502,
            _ => 500,
        }
    }
}

#[cfg(feature = "rquest")]
impl From<rquest::Error> for GateError {
    /// Transport failures (refused / timeout / DNS) all classify as network
    /// errors; anything else from the client layer does too.
    fn from(e: rquest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for GateError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GateError>;
