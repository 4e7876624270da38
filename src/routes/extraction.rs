use axum::{
    extract::{Multipart, Path, State},
    response::sse::{Event, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::{Document, SessionView};
use crate::state::AppState;

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Reads the first multipart field as a PDF upload.
async fn read_pdf(mut multipart: Multipart, max_bytes: usize) -> Result<Document, AppError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart data: {e}")))?
        .ok_or_else(|| AppError::Validation("No file provided".to_string()))?;

    let filename = field.file_name().unwrap_or("unnamed.pdf").to_string();

    let content_type = field
        .content_type()
        .unwrap_or(PDF_CONTENT_TYPE)
        .to_string();

    if content_type != PDF_CONTENT_TYPE {
        return Err(AppError::Validation(
            "Only PDF files are supported".to_string(),
        ));
    }

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;

    if data.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    if data.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "File too large. Maximum size is {} MB",
            max_bytes / 1024 / 1024
        )));
    }

    Ok(Document::new(filename, data.to_vec()))
}

pub async fn extract(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state.sessions.acquire(&id).await?;
    let document = read_pdf(multipart, state.config.upload.max_file_size_bytes()).await?;

    session
        .start_extraction(state.extractor.as_ref(), document)
        .await?;

    Ok(Json(session.view()))
}

#[derive(Serialize)]
struct FragmentEvent<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct FailureEvent {
    error: String,
    session: SessionView,
}

/// Streams fragments as `fragment` events while the extraction runs, then a
/// final `done` event with the session view, or `error` on failure.
pub async fn extract_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let mut session = state.sessions.acquire(&id).await?;
    let document = read_pdf(multipart, state.config.upload.max_file_size_bytes()).await?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let extractor = state.extractor.clone();

    tokio::spawn(async move {
        let fragment_tx = tx.clone();
        let outcome = session
            .start_extraction_with(extractor.as_ref(), document, move |fragment| {
                if let Ok(event) = Event::default()
                    .event("fragment")
                    .json_data(FragmentEvent { text: fragment })
                {
                    let _ = fragment_tx.send(event);
                }
            })
            .await;

        let last = match outcome {
            Ok(()) => Event::default().event("done").json_data(session.view()),
            Err(e) => Event::default().event("error").json_data(FailureEvent {
                error: e.to_string(),
                session: session.view(),
            }),
        };

        match last {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => tracing::error!("Failed to encode final extraction event: {e}"),
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok);
    Ok(Sse::new(stream))
}
