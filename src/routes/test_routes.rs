use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    Extension,
};
use validator::Validate;

use crate::dto::test_dto::{
    AvailableTestsResponse, CompletedTestsResponse, PublicTestEnvelope, StartTestResponse,
    SubmitTestRequest, SubmitTestResponse,
};
use crate::middleware::auth::CurrentUser;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_available(State(state): State<AppState>) -> crate::error::Result<Response> {
    let tests = state.test_service.list_available().await?;
    Ok(Json(AvailableTestsResponse { tests }).into_response())
}

#[axum::debug_handler]
pub async fn get_test_questions(
    State(state): State<AppState>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let test = state.test_service.public_test(test_id).await?;
    Ok(Json(PublicTestEnvelope { test }).into_response())
}

#[axum::debug_handler]
pub async fn start_test(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(test_id): Path<i64>,
) -> crate::error::Result<Response> {
    let started = state
        .attempt_service
        .start_or_resume(user_id, test_id)
        .await?;
    Ok(Json(StartTestResponse::from(started)).into_response())
}

#[axum::debug_handler]
pub async fn submit_test(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<SubmitTestRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let result = state.attempt_service.submit_answers(user_id, &req).await?;
    Ok(Json(SubmitTestResponse::from(result)).into_response())
}

#[axum::debug_handler]
pub async fn list_completed(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> crate::error::Result<Response> {
    let tests = state.attempt_service.completed_for_user(user_id).await?;
    Ok(Json(CompletedTestsResponse { tests }).into_response())
}
