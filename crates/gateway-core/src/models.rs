//! `GET /v1/models` listing: a supplemental surface outside the narrow
//! core routing/transformation scope, additive only.

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::state::AppState;

fn enabled_model_ids(state: &AppState) -> Vec<(String, String)> {
    state
        .providers
        .list()
        .into_iter()
        .filter(|provider| provider.enabled)
        .flat_map(|provider| {
            let name = provider.name.clone();
            provider.models.into_iter().map(move |model| (name.clone(), model))
        })
        .collect()
}

/// OpenAI-dialect listing: `{object:"list", data:[{id, object:"model", owned_by}]}`.
pub async fn openai_list_models(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<_> = enabled_model_ids(&state)
        .into_iter()
        .map(|(provider, model)| json!({"id": model, "object": "model", "owned_by": provider}))
        .collect();

    Json(json!({"object": "list", "data": data}))
}

/// Anthropic-dialect listing: `{data:[{id, type:"model", display_name}], has_more:false}`.
pub async fn anthropic_list_models(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<_> = enabled_model_ids(&state)
        .into_iter()
        .map(|(_, model)| json!({"id": model, "type": "model", "display_name": model}))
        .collect();

    Json(json!({"data": data, "has_more": false}))
}
