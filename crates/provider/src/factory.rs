//! Builds provider instances from catalog rows.
//!
//! The factory owns the kind → constructor mapping and the per-kind config
//! defaults; unknown catalog type strings degrade to the generic
//! OpenAI-compatible passthrough.

use crate::{openai_compat::OpenAiCompatProvider, qwen_direct::QwenDirectProvider};
use qwengate_store::Store;
use qwengate_types::{
    GateError, ProviderConfig, ProviderKind,
    traits::{Provider, Result},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructs providers from the durable catalog.
#[derive(Clone)]
pub struct ProviderFactory {
    store: Arc<Store>,
    http: rquest::Client,
}

/// Per-kind config defaults; the stored bag overrides these key-wise.
fn kind_defaults(kind: &ProviderKind) -> HashMap<String, Value> {
    let mut defaults = HashMap::new();
    match kind {
        ProviderKind::LmStudio => {
            defaults.insert("base_url".into(), json!("http://localhost:1234/v1"));
        }
        ProviderKind::QwenDirect => {
            defaults.insert("base_url".into(), json!("https://chat.qwen.ai"));
            defaults.insert("default_model".into(), json!("qwen3-max"));
        }
        ProviderKind::QwenProxy | ProviderKind::OpenAiCompat => {}
    }
    defaults
}

impl ProviderFactory {
    pub fn new(store: Arc<Store>, http: rquest::Client) -> Self {
        Self { store, http }
    }

    /// The backing store (shared with providers that read it per request).
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Loads a catalog row and constructs the matching provider.
    ///
    /// Steps: record lookup → config bag (JSON-decoded) merged over kind
    /// defaults → per-kind validation → model bindings attached → construct.
    ///
    /// # Errors
    ///
    /// [`GateError::ProviderNotFound`] for an absent row,
    /// [`GateError::ProviderDisabled`] for a disabled one, and
    /// [`GateError::Config`] when validation fails.
    pub async fn create_from_catalog(&self, provider_id: &str) -> Result<Arc<dyn Provider>> {
        let record = self
            .store
            .provider(provider_id)
            .await?
            .ok_or_else(|| GateError::ProviderNotFound(provider_id.to_string()))?;
        if !record.enabled {
            return Err(GateError::ProviderDisabled(provider_id.to_string()));
        }

        let mut values = kind_defaults(&record.kind);
        values.extend(self.store.provider_config(provider_id).await?);

        match record.kind {
            ProviderKind::QwenDirect => {
                // credential material lives in the store, not the bag
                let cred = self.store.credential().await?;
                if !cred.is_some_and(|c| !c.token.is_empty() && !c.cookies.is_empty()) {
                    return Err(GateError::Config(format!(
                        "provider {provider_id}: qwen_direct requires stored credentials"
                    )));
                }
            }
            _ => {
                if values
                    .get("base_url")
                    .and_then(Value::as_str)
                    .is_none_or(str::is_empty)
                {
                    return Err(GateError::Config(format!(
                        "provider {provider_id}: base_url is required"
                    )));
                }
            }
        }

        let models = self.store.provider_models(provider_id).await?;
        let default_model = models
            .iter()
            .find(|m| m.is_default)
            .map(|m| m.id.clone())
            .or_else(|| {
                values
                    .get("default_model")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            });
        let config = ProviderConfig {
            values,
            models,
            default_model,
        };

        let provider: Arc<dyn Provider> = match record.kind {
            ProviderKind::QwenDirect => Arc::new(QwenDirectProvider::new(
                record.id,
                record.name,
                &config,
                Arc::clone(&self.store),
                self.http.clone(),
            )),
            kind => Arc::new(OpenAiCompatProvider::new(
                record.id,
                record.name,
                kind,
                &config,
                self.http.clone(),
            )?),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qwengate_types::ProviderRecord;

    async fn store() -> Arc<Store> {
        Arc::new(Store::new("sqlite::memory:").await.unwrap())
    }

    fn record(id: &str, kind: ProviderKind) -> ProviderRecord {
        ProviderRecord {
            id: id.into(),
            name: format!("{id} display"),
            kind,
            enabled: true,
            priority: 0,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let f = ProviderFactory::new(store().await, rquest::Client::new());
        assert!(matches!(
            f.create_from_catalog("ghost").await,
            Err(GateError::ProviderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_rejected() {
        let s = store().await;
        let mut rec = record("off", ProviderKind::LmStudio);
        rec.enabled = false;
        s.seed_provider(&rec, &[], &[]).await.unwrap();
        let f = ProviderFactory::new(s, rquest::Client::new());
        assert!(matches!(
            f.create_from_catalog("off").await,
            Err(GateError::ProviderDisabled(_))
        ));
    }

    #[tokio::test]
    async fn test_lm_studio_default_base_url() {
        let s = store().await;
        s.seed_provider(&record("lm", ProviderKind::LmStudio), &[], &[])
            .await
            .unwrap();
        let f = ProviderFactory::new(s, rquest::Client::new());
        let p = f.create_from_catalog("lm").await.unwrap();
        assert_eq!(p.kind(), ProviderKind::LmStudio);
        assert_eq!(p.base_url(), Some("http://localhost:1234/v1"));
    }

    #[tokio::test]
    async fn test_bag_overrides_defaults() {
        let s = store().await;
        s.seed_provider(
            &record("lm", ProviderKind::LmStudio),
            &[("base_url", json!("http://10.0.0.5:1234/v1"), false)],
            &[],
        )
        .await
        .unwrap();
        let f = ProviderFactory::new(s, rquest::Client::new());
        let p = f.create_from_catalog("lm").await.unwrap();
        assert_eq!(p.base_url(), Some("http://10.0.0.5:1234/v1"));
    }

    #[tokio::test]
    async fn test_generic_requires_base_url() {
        let s = store().await;
        s.seed_provider(&record("gen", ProviderKind::OpenAiCompat), &[], &[])
            .await
            .unwrap();
        let f = ProviderFactory::new(s, rquest::Client::new());
        assert!(matches!(
            f.create_from_catalog("gen").await,
            Err(GateError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_qwen_proxy_requires_base_url() {
        let s = store().await;
        s.seed_provider(&record("qp", ProviderKind::QwenProxy), &[], &[])
            .await
            .unwrap();
        let f = ProviderFactory::new(s, rquest::Client::new());
        assert!(matches!(
            f.create_from_catalog("qp").await,
            Err(GateError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_qwen_direct_requires_credentials() {
        let s = store().await;
        s.seed_provider(&record("qd", ProviderKind::QwenDirect), &[], &[])
            .await
            .unwrap();
        let f = ProviderFactory::new(Arc::clone(&s), rquest::Client::new());
        assert!(matches!(
            f.create_from_catalog("qd").await,
            Err(GateError::Config(_))
        ));

        s.set_credential("tok", "c=1", None).await.unwrap();
        let p = f.create_from_catalog("qd").await.unwrap();
        assert_eq!(p.kind(), ProviderKind::QwenDirect);
        p.destroy().await;
    }

    #[tokio::test]
    async fn test_default_model_from_bindings() {
        let s = store().await;
        s.set_credential("tok", "c=1", None).await.unwrap();
        s.seed_provider(
            &record("qd", ProviderKind::QwenDirect),
            &[],
            &[("qwen3-coder", "Qwen3 Coder", true)],
        )
        .await
        .unwrap();
        let f = ProviderFactory::new(s, rquest::Client::new());
        let p = f.create_from_catalog("qd").await.unwrap();
        let models = p.list_models().await.unwrap();
        assert_eq!(models["data"][0]["id"], "qwen3-coder");
        p.destroy().await;
    }
}
