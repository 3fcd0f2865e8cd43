//! Provider catalog types and the Qwen credential record.

use crate::{GateError, error::Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Desktop User-Agent presented to the Qwen chat host. Wire-significant:
/// the upstream rejects unrecognized agents on some routes.
pub const QWEN_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// The concrete adapter class behind a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local LM Studio server, OpenAI-compatible.
    LmStudio,
    /// Qwen proxy server with tool-transformation semantics, OpenAI-compatible.
    QwenProxy,
    /// Direct Qwen chat client (native wire format, conversational state).
    QwenDirect,
    /// Generic OpenAI-compatible fallback for unknown catalog types.
    OpenAiCompat,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LmStudio => write!(f, "lm_studio"),
            Self::QwenProxy => write!(f, "qwen_proxy"),
            Self::QwenDirect => write!(f, "qwen_direct"),
            Self::OpenAiCompat => write!(f, "openai_compat"),
        }
    }
}

impl ProviderKind {
    /// Map a catalog `type` string to a kind. Unknown strings degrade to
    /// the generic OpenAI-compatible passthrough rather than erroring.
    #[must_use]
    pub fn from_catalog(s: &str) -> Self {
        match s {
            "lm_studio" => Self::LmStudio,
            "qwen_proxy" => Self::QwenProxy,
            "qwen_direct" => Self::QwenDirect,
            _ => Self::OpenAiCompat,
        }
    }
}

/// A row of the `providers` catalog table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Stable, globally unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Catalog type string; see [`ProviderKind::from_catalog`].
    pub kind: ProviderKind,
    pub enabled: bool,
    /// Higher loads first; ties broken by name ascending.
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A model bound to a provider through the `provider_models` relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability tags (`chat`, `streaming`, `tools`, `vision`).
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub is_default: bool,
}

/// The effective configuration a provider is constructed with: per-kind
/// defaults overlaid with the catalog's config bag, plus model bindings.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub values: HashMap<String, serde_json::Value>,
    pub models: Vec<ProviderModel>,
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// String view of a config value; JSON strings are returned unquoted.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// The stored Qwen credential record: opaque bearer material harvested by
/// the login flow, read back on every upstream call.
///
/// `expires_at` is in **seconds** since the epoch — the one place in the
/// system that is not milliseconds. The persisted schema fixes this unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QwenCredential {
    pub token: String,
    pub cookies: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QwenCredential {
    /// Seconds since the epoch, the unit of `expires_at`.
    #[must_use]
    pub fn now_seconds() -> i64 {
        i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs(),
        )
        .unwrap_or(i64::MAX)
    }

    /// `token≠∅ ∧ cookies≠∅ ∧ (expires_at = null ∨ expires_at > now_seconds)`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty()
            && !self.cookies.is_empty()
            && self.expires_at.is_none_or(|e| e > Self::now_seconds())
    }

    /// The exact header set the Qwen chat host expects. Header names are
    /// wire-significant and must not be renamed.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::CredentialsMissing`] when the record is not
    /// valid (empty material or past expiry).
    pub fn headers(&self) -> Result<Vec<(&'static str, String)>> {
        if !self.is_valid() {
            return Err(GateError::CredentialsMissing);
        }
        Ok(vec![
            ("bx-umidtoken", self.token.clone()),
            ("Cookie", self.cookies.clone()),
            ("Content-Type", "application/json".to_string()),
            ("User-Agent", QWEN_USER_AGENT.to_string()),
        ])
    }
}
