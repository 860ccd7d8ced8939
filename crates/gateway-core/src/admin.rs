//! Admin API: CRUD over the provider registry.
//!
//! Nested under `/providers` by [`crate::dispatch::build_router`].

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use config::ProviderConfig;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{GatewayError, Result};
use crate::registry::ProviderRecord;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{name}", get(get_one).put(update).delete(delete))
        .route("/{name}/toggle", patch(toggle))
}

fn record_to_json(record: &ProviderRecord) -> Value {
    json!({
        "name": record.name,
        "base_url": record.api_base_url.to_string(),
        "models": record.models,
        "enabled": record.enabled,
    })
}

async fn create(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response> {
    let config: ProviderConfig = serde_json::from_value(body)
        .map_err(|err| GatewayError::InvalidRequest(format!("missing or invalid field: {err}")))?;

    let record = ProviderRecord::from_config(&config, &state.transformers);
    state.providers.register(record.clone())?;

    Ok((axum::http::StatusCode::CREATED, Json(record_to_json(&record))).into_response())
}

async fn list(State(state): State<AppState>) -> Result<Response> {
    let records: Vec<_> = state.providers.list().iter().map(record_to_json).collect();
    Ok(Json(json!({"providers": records})).into_response())
}

async fn get_one(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    let record = state
        .providers
        .get(&name)
        .ok_or_else(|| GatewayError::ProviderNotFound(name.clone()))?;
    Ok(Json(record_to_json(&record)).into_response())
}

async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response> {
    let mut config: ProviderConfig = serde_json::from_value(body)
        .map_err(|err| GatewayError::InvalidRequest(format!("missing or invalid field: {err}")))?;
    config.name = name;

    let record = ProviderRecord::from_config(&config, &state.transformers);
    state.providers.update(record.clone())?;

    Ok(Json(record_to_json(&record)).into_response())
}

async fn delete(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    state.providers.delete(&name)?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

#[derive(Deserialize)]
struct ToggleBody {
    #[allow(dead_code)]
    enabled: bool,
}

/// A documented no-op: flips `ProviderRecord.enabled` but `resolve` never
/// consults it (see the `toggle` design note in `DESIGN.md`).
async fn toggle(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(_body): Json<ToggleBody>,
) -> Result<Response> {
    let enabled = state.providers.toggle(&name)?;
    Ok(Json(json!({"name": name, "enabled": enabled})).into_response())
}
