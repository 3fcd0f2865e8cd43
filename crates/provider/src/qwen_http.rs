//! Authenticated HTTP client for the Qwen chat host.
//!
//! Every call fetches fresh headers from the credential store before each
//! attempt, so a credential rotation takes effect mid-flight. Transient
//! failures (429, 5xx, transport) go through `retry_with_backoff`; auth and
//! not-found are terminal.

use crate::http_util::ProviderHttp;
use qwengate_store::Store;
use qwengate_types::{
    GateError,
    traits::{ChatReply, Result},
};
use rquest::{Client, RequestBuilder};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default Qwen chat host.
pub const DEFAULT_BASE_URL: &str = "https://chat.qwen.ai";

/// Timeout for chat creation and non-streaming sends. A streaming send is
/// only bounded until its headers arrive; the body itself is unbounded.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff configuration for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Classifies a non-success Qwen status into the error taxonomy.
/// 401/403 mean rotated or expired credentials; 404 means the native chat
/// id is gone (usually a stale session mapping).
#[must_use]
pub fn classify_status(status: u16, body: String) -> GateError {
    match status {
        401 | 403 => GateError::CredentialsExpired,
        404 => GateError::ChatNotFound(body),
        429 => GateError::RateLimited { status },
        s if s >= 500 => GateError::UpstreamServer { status, body },
        _ => GateError::UpstreamClient { status, body },
    }
}

/// Authenticated client for the Qwen chat API.
pub struct QwenClient {
    ph: ProviderHttp,
    base_url: String,
    store: Arc<Store>,
    retry: RetryPolicy,
}

impl QwenClient {
    /// Creates a client for the given host (trailing slash tolerated).
    pub fn new(http: Client, store: Arc<Store>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            ph: ProviderHttp::new(http),
            base_url,
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the default retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The configured upstream host.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the current credential record and applies its header set.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::CredentialsMissing`] when no usable record is
    /// stored — callers must not retry on this.
    async fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let cred = self
            .store
            .credential()
            .await?
            .ok_or(GateError::CredentialsMissing)?;
        let mut builder = builder;
        for (name, value) in cred.headers()? {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    /// Runs `f` with exponential backoff on retryable errors.
    async fn retry_with_backoff<'a, T>(
        &'a self,
        op: &str,
        f: impl Fn() -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    ) -> Result<T> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(op, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying upstream call");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_create_chat(&self, title: &str, model: &str) -> Result<String> {
        let payload = qwengate_translate::build_create_chat_payload(title, model);
        let builder = self
            .ph
            .client()
            .post(format!("{}/api/v2/chats/new", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&payload);
        let resp = self.send_classified(self.authed(builder).await?).await?;
        let body: Value = resp.json().await?;
        body.pointer("/data/id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                GateError::Internal(format!("create-chat response missing data.id: {body}"))
            })
    }

    /// Creates a new upstream chat and returns its id.
    pub async fn create_chat(&self, title: &str, model: &str) -> Result<String> {
        self.retry_with_backoff("create_chat", || {
            Box::pin(self.try_create_chat(title, model))
        })
        .await
    }

    async fn try_send_message(
        &self,
        chat_id: &str,
        payload: &Value,
        stream: bool,
    ) -> Result<ChatReply> {
        let mut builder = self
            .ph
            .client()
            .post(format!(
                "{}/api/v2/chat/completions?chat_id={chat_id}",
                self.base_url
            ))
            .json(payload);
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        } else {
            // the timeout bounds the full body read, so streaming sends skip it
            builder = builder.timeout(REQUEST_TIMEOUT);
        }
        let resp = self.send_classified(self.authed(builder).await?).await?;
        if stream {
            Ok(ChatReply::Stream(ProviderHttp::byte_stream(resp)))
        } else {
            Ok(ChatReply::Complete(resp.json().await?))
        }
    }

    /// Sends one turn to an existing chat. Streaming replies are the raw
    /// native SSE bytes; the caller owns translation.
    pub async fn send_message(
        &self,
        chat_id: &str,
        payload: &Value,
        stream: bool,
    ) -> Result<ChatReply> {
        self.retry_with_backoff("send_message", || {
            Box::pin(self.try_send_message(chat_id, payload, stream))
        })
        .await
    }

    async fn try_list_models(&self) -> Result<Value> {
        let builder = self
            .ph
            .client()
            .get(format!("{}/api/models", self.base_url))
            .timeout(REQUEST_TIMEOUT);
        let resp = self.send_classified(self.authed(builder).await?).await?;
        Ok(resp.json().await?)
    }

    /// Lists the models the upstream advertises.
    pub async fn list_models(&self) -> Result<Value> {
        self.retry_with_backoff("list_models", || Box::pin(self.try_list_models()))
            .await
    }

    /// Credential validity plus a live round-trip.
    pub async fn health_check(&self) -> bool {
        match self.store.credential().await {
            Ok(Some(cred)) if cred.is_valid() => {}
            _ => return false,
        }
        self.list_models().await.is_ok()
    }

    /// Sends and maps non-success statuses through [`classify_status`].
    async fn send_classified(&self, builder: RequestBuilder) -> Result<rquest::Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(classify_status(status.as_u16(), text))
        }
    }
}
