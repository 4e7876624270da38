use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::SessionView;
use crate::state::AppState;

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let handle = state.sessions.create().await;
    let view = handle.lock().await.view();
    (StatusCode::CREATED, Json(view))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.snapshot(&id).await?))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
