//! Health probe and static API info handlers.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;

/// Handles `GET /health`: per-provider status plus an overall verdict.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let providers = state.registry.get_all().await;
    let mut entries = serde_json::Map::new();
    let mut all_ok = true;

    for provider in &providers {
        let ok = provider.health_check().await;
        all_ok &= ok;
        let mut entry = serde_json::Map::new();
        entry.insert(
            "status".into(),
            json!(if ok { "ok" } else { "unhealthy" }),
        );
        if let Some(url) = provider.base_url() {
            entry.insert("base_url".into(), json!(url));
        }
        entries.insert(provider.id().to_string(), Value::Object(entry));
    }

    Json(json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "providers": entries,
        "registered_providers": state.registry.get_all_ids().await,
    }))
}

/// Handles `GET /`: static API description.
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "qwengate",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /v1/chat/completions",
            "GET /v1/models",
            "GET /health"
        ]
    }))
}
