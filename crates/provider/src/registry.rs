//! Process-wide registry of live provider instances.
//!
//! The registry exclusively owns every provider; the router only ever sees
//! `Arc` handles. Mutation happens through (un)register/reload/clear behind
//! a read-write lock, so readers never observe a half-swapped provider.

use crate::factory::ProviderFactory;
use qwengate_types::{
    GateError, ProviderKind,
    traits::{Provider, Result},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of live providers keyed by catalog id.
pub struct Registry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    factory: ProviderFactory,
}

impl Registry {
    pub fn new(factory: ProviderFactory) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Loads every enabled catalog row in priority order. A provider whose
    /// construction fails is logged and skipped; a failing health check is
    /// logged but does not prevent registration. Returns the number loaded.
    pub async fn load_all(&self) -> Result<usize> {
        let records = self.factory.store().enabled_providers().await?;
        let mut loaded = 0;
        for record in records {
            match self.factory.create_from_catalog(&record.id).await {
                Ok(provider) => {
                    if !provider.health_check().await {
                        tracing::warn!(provider = %record.id, "health check failed at load; registering anyway");
                    }
                    self.register(record.id.clone(), provider).await;
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(provider = %record.id, error = %e, "failed to construct provider");
                }
            }
        }
        tracing::info!(loaded, "provider registry loaded");
        Ok(loaded)
    }

    /// Replaces one provider with a freshly constructed instance. The old
    /// instance (if any) is destroyed first — its session state is gone.
    pub async fn reload(&self, id: &str) -> Result<()> {
        self.unregister(id).await;
        let provider = self.factory.create_from_catalog(id).await?;
        self.register(id.to_string(), provider).await;
        Ok(())
    }

    /// Destroys everything and reloads from the catalog.
    pub async fn reload_all(&self) -> Result<usize> {
        self.clear().await;
        self.load_all().await
    }

    /// Registers a provider. A duplicate id overwrites with a warning; the
    /// displaced instance is destroyed.
    pub async fn register(&self, id: String, provider: Arc<dyn Provider>) {
        let previous = self.providers.write().await.insert(id.clone(), provider);
        if let Some(old) = previous {
            tracing::warn!(provider = %id, "duplicate register; replacing existing instance");
            old.destroy().await;
        }
    }

    /// Removes a provider, destroying it. `false` when absent.
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.providers.write().await.remove(id);
        match removed {
            Some(provider) => {
                provider.destroy().await;
                true
            }
            None => false,
        }
    }

    /// A handle to a registered provider.
    ///
    /// # Errors
    ///
    /// [`GateError::ProviderNotLoaded`] when absent.
    pub async fn get(&self, id: &str) -> Result<Arc<dyn Provider>> {
        self.get_safe(id)
            .await
            .ok_or_else(|| GateError::ProviderNotLoaded(id.to_string()))
    }

    /// Non-erroring lookup.
    pub async fn get_safe(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().await.get(id).cloned()
    }

    pub async fn has(&self, id: &str) -> bool {
        self.providers.read().await.contains_key(id)
    }

    /// All live providers in unspecified order.
    pub async fn get_all(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.read().await.values().cloned().collect()
    }

    /// All registered ids, sorted for stable output.
    pub async fn get_all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn get_by_type(&self, kind: &ProviderKind) -> Vec<Arc<dyn Provider>> {
        self.providers
            .read()
            .await
            .values()
            .filter(|p| p.kind() == *kind)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.providers.read().await.len()
    }

    /// Destroys and removes every provider.
    pub async fn clear(&self) {
        let drained: Vec<Arc<dyn Provider>> =
            self.providers.write().await.drain().map(|(_, p)| p).collect();
        for provider in drained {
            provider.destroy().await;
        }
    }

    /// Probes every registered provider.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let providers = self.get_all().await;
        let mut results = HashMap::with_capacity(providers.len());
        for provider in providers {
            results.insert(provider.id().to_string(), provider.health_check().await);
        }
        results
    }
}
