use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::assistant::{SubmitOutcome, WELCOME};
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
///
/// Validation failures raised by the database layer ("Project not found",
/// empty titles) are passed through with BAD_REQUEST; anything else becomes
/// a generic 500.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();

    if msg.contains("not found") || msg.contains("must not be empty") {
        tracing::warn!("Validation error: {}", msg);
        return (StatusCode::BAD_REQUEST, msg);
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<Project>>, (StatusCode, String)> {
    state.db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, (StatusCode, String)> {
    state
        .db
        .get_project(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), (StatusCode, String)> {
    state
        .db
        .create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<Project>, (StatusCode, String)> {
    state
        .db
        .update_project(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

// ============================================================
// Tasks
// ============================================================

pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    state.db.get_all_tasks().map(Json).map_err(internal_error)
}

pub async fn list_project_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    state
        .db
        .get_project(project_id)
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Project"))?;

    state
        .db
        .get_tasks_by_project(project_id)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_task(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    state
        .db
        .create_task(project_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, (StatusCode, String)> {
    state
        .db
        .get_task(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTaskInput>,
) -> Result<Json<Task>, (StatusCode, String)> {
    state
        .db
        .update_task(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

// ============================================================
// Assistant
// ============================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OpenSessionInput {
    /// The signed-in user. Anonymous sessions are told to sign in.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionOpened {
    pub id: Uuid,
    pub welcome: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitMessageInput {
    pub text: String,
}

pub async fn open_session(
    State(state): State<AppState>,
    Json(input): Json<OpenSessionInput>,
) -> (StatusCode, Json<SessionOpened>) {
    let handle = state.sessions.open(input.user_id);
    (
        StatusCode::CREATED,
        Json(SessionOpened {
            id: handle.id(),
            welcome: WELCOME.to_string(),
        }),
    )
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.sessions.close(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Session"))
    }
}

pub async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    let handle = state.sessions.get(id).ok_or_else(|| not_found("Session"))?;
    Ok(Json(handle.messages()))
}

pub async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<SubmitMessageInput>,
) -> Result<Json<SubmitOutcome>, (StatusCode, String)> {
    let handle = state.sessions.get(id).ok_or_else(|| not_found("Session"))?;
    let outcome = handle.submit(&state.assistant, &input.text).await;
    Ok(Json(outcome))
}
