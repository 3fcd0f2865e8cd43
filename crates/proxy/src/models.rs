//! Models listing handler — returns available models in OpenAI format.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    /// Restrict the listing to one provider id.
    pub provider: Option<String>,
}

/// Handles `GET /v1/models[?provider=<id>]`.
///
/// Named provider: that provider's list; an unknown id yields an empty
/// list, not an error. Unnamed: the union across registered providers.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModelsQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut data = Vec::new();

    if let Some(provider_id) = query.provider {
        if let Some(provider) = state.registry.get_safe(&provider_id).await {
            append_models(&mut data, &provider.list_models().await?);
        }
    } else {
        for provider in state.registry.get_all().await {
            match provider.list_models().await {
                Ok(list) => append_models(&mut data, &list),
                Err(e) => {
                    tracing::warn!(provider = %provider.id(), error = %e, "model listing failed");
                }
            }
        }
    }

    Ok(Json(json!({"object": "list", "data": data})))
}

fn append_models(data: &mut Vec<Value>, list: &Value) {
    if let Some(entries) = list.get("data").and_then(Value::as_array) {
        data.extend(entries.iter().cloned());
    }
}
