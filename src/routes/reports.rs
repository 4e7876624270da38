use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::SessionView;
use crate::state::AppState;

const SAVED_MESSAGE: &str = "Relatório Salvo !!";

#[derive(Debug, Deserialize)]
pub struct EditReportRequest {
    pub report_text: String,
}

pub async fn edit_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditReportRequest>,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state.sessions.acquire(&id).await?;
    session.edit(payload.report_text)?;
    Ok(Json(session.view()))
}

#[derive(Debug, Deserialize)]
pub struct SaveReportRequest {
    /// Text to store. Defaults to the session's current text.
    pub report_text: Option<String>,
    pub report_name: String,
}

#[derive(Debug, Serialize)]
pub struct SaveReportResponse {
    pub path: String,
    pub message: String,
}

pub async fn save_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveReportRequest>,
) -> Result<Json<SaveReportResponse>, AppError> {
    let mut session = state.sessions.acquire(&id).await?;

    let report_text = payload
        .report_text
        .unwrap_or_else(|| session.report_text().to_string());

    let path = session
        .save(
            state.reports.as_ref(),
            &state.save_target(),
            report_text,
            &payload.report_name,
        )
        .await?;

    Ok(Json(SaveReportResponse {
        path,
        message: SAVED_MESSAGE.to_string(),
    }))
}
