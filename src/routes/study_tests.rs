use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use validator::Validate;

use crate::dto::study_test_dto::{
    AttemptDetailResponse, CreateStudyTestRequest, SaveAnswerRequest, StartAttemptRequest,
    SubmitAttemptRequest,
};
use crate::models::study_material::StudyMaterial;
use crate::services::{extract_service, prompt_service};
use crate::AppState;

const DEFAULT_INSTRUCTIONS: &str = "Create a comprehensive practice test covering all the material.";

/// Multipart upload -> extraction -> directive -> generation call.
///
/// Nothing is persisted here; the client reviews the result and saves it
/// through `create_study_test`.
#[axum::debug_handler]
pub async fn generate_study_test(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> crate::error::Result<Response> {
    let mut instructions = String::new();
    let mut uploads: Vec<(String, bytes::Bytes)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(crate::error::Error::Multipart)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(filename) = field.file_name().map(|f| f.to_string()) {
            let data = field
                .bytes()
                .await
                .map_err(crate::error::Error::Multipart)?;
            if !filename.is_empty() && !data.is_empty() {
                uploads.push((filename, data));
            }
        } else if name == "instructions" {
            instructions = field
                .text()
                .await
                .map_err(crate::error::Error::Multipart)?;
        }
    }

    if uploads.is_empty() {
        return Err(crate::error::Error::BadRequest(
            "No files uploaded".to_string(),
        ));
    }

    let mut materials = Vec::new();
    for (filename, data) in &uploads {
        if !extract_service::is_supported(filename) {
            tracing::info!("Skipping unsupported upload: {}", filename);
            continue;
        }
        let text = extract_service::extract_text(filename, data).await;
        materials.push(StudyMaterial {
            filename: filename.clone(),
            text,
        });
    }

    if materials.is_empty() {
        return Err(crate::error::Error::BadRequest(
            "None of the uploaded files are a supported document type".to_string(),
        ));
    }

    let instructions = instructions.trim();
    let instructions = if instructions.is_empty() {
        DEFAULT_INSTRUCTIONS
    } else {
        instructions
    };

    let directive = prompt_service::compose_directive(&materials, instructions);
    tracing::info!(
        files = materials.len(),
        directive_len = directive.len(),
        "Requesting test generation"
    );

    let content = state.generation_service.generate(&directive).await?;
    Ok(Json(content).into_response())
}

#[axum::debug_handler]
pub async fn list_study_tests(State(state): State<AppState>) -> crate::error::Result<Response> {
    let tests = state.test_service.list_tests().await?;
    Ok(Json(tests).into_response())
}

#[axum::debug_handler]
pub async fn create_study_test(
    State(state): State<AppState>,
    Json(req): Json<CreateStudyTestRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let test = state.test_service.create_test(req).await?;
    Ok((StatusCode::CREATED, Json(test)).into_response())
}

#[axum::debug_handler]
pub async fn get_study_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> crate::error::Result<Response> {
    let test = state.test_service.get_test_by_id(id).await?;
    Ok(Json(test).into_response())
}

#[axum::debug_handler]
pub async fn delete_study_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> crate::error::Result<Response> {
    if !state.test_service.delete_test(id).await? {
        return Err(crate::error::Error::NotFound(format!(
            "Test {} not found",
            id
        )));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<StartAttemptRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let attempt = state
        .attempt_service
        .start_attempt(id, req.mode, req.timer_minutes)
        .await?;
    Ok((StatusCode::CREATED, Json(attempt)).into_response())
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> crate::error::Result<Response> {
    // 404 for an unknown test rather than an empty history.
    state.test_service.get_test_by_id(id).await?;
    let attempts = state.attempt_service.list_attempts_for_test(id).await?;
    Ok(Json(attempts).into_response())
}

#[axum::debug_handler]
pub async fn get_analytics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> crate::error::Result<Response> {
    state.test_service.get_test_by_id(id).await?;
    let analytics = state.attempt_service.analytics_for_test(id).await?;
    Ok(Json(analytics).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> crate::error::Result<Response> {
    let attempt = state.attempt_service.get_attempt_by_id(id).await?;
    let answers = state.attempt_service.get_answers(id).await?;
    Ok(Json(AttemptDetailResponse { attempt, answers }).into_response())
}

#[axum::debug_handler]
pub async fn delete_attempt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> crate::error::Result<Response> {
    if !state.attempt_service.delete_attempt(id).await? {
        return Err(crate::error::Error::NotFound(format!(
            "Attempt {} not found",
            id
        )));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SaveAnswerRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let answer = state.attempt_service.save_answer(id, &req).await?;
    Ok(Json(answer).into_response())
}

#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let attempt = state.attempt_service.submit_attempt(id, &req).await?;
    Ok(Json(attempt).into_response())
}
