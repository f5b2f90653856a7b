use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Map, Value};

use crate::services::entity_service::EntityTable;
use crate::AppState;

fn resolve(collection: &str) -> crate::error::Result<EntityTable> {
    EntityTable::from_path(collection).ok_or_else(|| {
        crate::error::Error::NotFound(format!("Unknown collection: {}", collection))
    })
}

#[axum::debug_handler]
pub async fn list_rows(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> crate::error::Result<Response> {
    let table = resolve(&collection)?;
    let rows = state.entity_service.list(table).await?;
    Ok(Json(rows).into_response())
}

#[axum::debug_handler]
pub async fn create_row(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> crate::error::Result<Response> {
    let table = resolve(&collection)?;
    let id = state.entity_service.insert(table, &fields).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

#[axum::debug_handler]
pub async fn update_row(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, i64)>,
    Json(fields): Json<Map<String, Value>>,
) -> crate::error::Result<Response> {
    let table = resolve(&collection)?;
    state.entity_service.update(table, id, &fields).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

#[axum::debug_handler]
pub async fn delete_row(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, i64)>,
) -> crate::error::Result<Response> {
    let table = resolve(&collection)?;
    if !state.entity_service.delete(table, id).await? {
        return Err(crate::error::Error::NotFound(format!(
            "No {} row with id {}",
            table.table_name(),
            id
        )));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

#[axum::debug_handler]
pub async fn get_settings(State(state): State<AppState>) -> crate::error::Result<Response> {
    let settings = state.entity_service.get_settings().await?;
    Ok(Json(Value::Object(settings)).into_response())
}

#[axum::debug_handler]
pub async fn save_settings(
    State(state): State<AppState>,
    Json(values): Json<Map<String, Value>>,
) -> crate::error::Result<Response> {
    state.entity_service.save_settings(&values).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

#[axum::debug_handler]
pub async fn initialize_defaults(State(state): State<AppState>) -> crate::error::Result<Response> {
    let seeded = state.entity_service.initialize_defaults().await?;
    Ok(Json(json!({ "success": true, "seeded": seeded })).into_response())
}

#[axum::debug_handler]
pub async fn backup(State(state): State<AppState>) -> crate::error::Result<Response> {
    let backup = state.entity_service.backup().await?;
    Ok(Json(backup).into_response())
}
