pub mod store;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::AppError;
use crate::services::accumulator::StreamAccumulator;
use crate::services::gemini::ExtractionClient;
use crate::services::naming::suggest_default_name;
use crate::services::prompts::TRENDSPOT_INSTRUCTIONS;
use crate::services::storage::{ReportStore, report_key};

pub use store::SessionStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Extracting,
    Extracted,
    Editing,
    Saving,
    Saved,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Extracting => write!(f, "extracting"),
            SessionState::Extracted => write!(f, "extracted"),
            SessionState::Editing => write!(f, "editing"),
            SessionState::Saving => write!(f, "saving"),
            SessionState::Saved => write!(f, "saved"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// An uploaded PDF. Consumed by a single extraction attempt.
#[derive(Debug)]
pub struct Document {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

/// Where saved reports go.
#[derive(Debug, Clone)]
pub struct SaveTarget {
    pub bucket: String,
    pub folder: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub state: SessionState,
    pub document_name: Option<String>,
    pub report_text: String,
    pub suggested_name: String,
    pub last_error: Option<String>,
    pub saved_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ReportSession {
    id: Uuid,
    state: SessionState,
    document_name: Option<String>,
    report_text: String,
    last_error: Option<String>,
    saved_path: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Last published view, readable while the session is locked.
    snapshot: watch::Sender<SessionView>,
}

impl Default for ReportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSession {
    pub fn new() -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let initial = SessionView {
            id,
            state: SessionState::Idle,
            document_name: None,
            report_text: String::new(),
            suggested_name: suggest_default_name(""),
            last_error: None,
            saved_path: None,
            created_at: now,
            updated_at: now,
        };

        Self {
            id,
            state: SessionState::Idle,
            document_name: None,
            report_text: String::new(),
            last_error: None,
            saved_path: None,
            created_at: now,
            updated_at: now,
            snapshot: watch::Sender::new(initial),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn report_text(&self) -> &str {
        &self.report_text
    }

    pub fn suggested_name(&self) -> String {
        suggest_default_name(&self.report_text)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            state: self.state,
            document_name: self.document_name.clone(),
            report_text: self.report_text.clone(),
            suggested_name: self.suggested_name(),
            last_error: self.last_error.clone(),
            saved_path: self.saved_path.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Follows every published change of [`view`](Self::view).
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.snapshot.subscribe()
    }

    /// Moves to `next` and publishes the resulting view. Every mutation ends
    /// with a transition.
    fn transition(&mut self, next: SessionState) {
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "Session transition");
        self.state = next;
        self.updated_at = Utc::now();
        self.snapshot.send_replace(self.view());
    }

    pub async fn start_extraction(
        &mut self,
        extractor: &dyn ExtractionClient,
        document: Document,
    ) -> Result<(), AppError> {
        self.start_extraction_with(extractor, document, |_| {}).await
    }

    /// Replaces the report text with a fresh extraction of `document`.
    ///
    /// `observer` sees every non-empty fragment as it arrives. On failure the
    /// fragments received so far stay in the session and the state becomes
    /// `Failed`.
    pub async fn start_extraction_with<F>(
        &mut self,
        extractor: &dyn ExtractionClient,
        document: Document,
        observer: F,
    ) -> Result<(), AppError>
    where
        F: FnMut(&str) + Send,
    {
        let Document { filename, data } = document;

        self.report_text.clear();
        self.last_error = None;
        self.saved_path = None;
        self.document_name = Some(filename);
        self.transition(SessionState::Extracting);

        tracing::info!(session = %self.id, bytes = data.len(), "Starting extraction");
        let encoded = BASE64.encode(&data);
        drop(data);

        let stream = match extractor.extract(&encoded, TRENDSPOT_INSTRUCTIONS).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_extraction(e)),
        };

        let result = StreamAccumulator::new()
            .collect_with(stream, observer)
            .await;
        self.report_text = result.text;

        match result.error {
            None => {
                tracing::info!(
                    session = %self.id,
                    fragments = result.fragments,
                    chars = self.report_text.len(),
                    "Extraction finished"
                );
                self.transition(SessionState::Extracted);
                Ok(())
            }
            Some(e) => Err(self.fail_extraction(e)),
        }
    }

    fn fail_extraction(&mut self, e: anyhow::Error) -> AppError {
        let msg = format!("{e:#}");
        tracing::warn!(
            session = %self.id,
            partial_chars = self.report_text.len(),
            "Extraction failed: {msg}"
        );
        self.last_error = Some(msg.clone());
        self.transition(SessionState::Failed);
        AppError::Extraction(msg)
    }

    /// Replaces the report text with the user's edits.
    pub fn edit(&mut self, report_text: String) -> Result<(), AppError> {
        if self.state == SessionState::Idle || self.state == SessionState::Extracting {
            return Err(AppError::Conflict(
                "There is no extracted report to edit yet".to_string(),
            ));
        }
        self.report_text = report_text;
        self.transition(SessionState::Editing);
        Ok(())
    }

    /// Uploads `report_text` as `<folder>/<report_name>.txt`.
    ///
    /// Blank names and blank text are rejected before any I/O, as is a session
    /// with no finished extraction. On storage failure the session text is left
    /// as it was.
    pub async fn save(
        &mut self,
        store: &dyn ReportStore,
        target: &SaveTarget,
        report_text: String,
        report_name: &str,
    ) -> Result<String, AppError> {
        if report_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Report name cannot be blank".to_string(),
            ));
        }
        if report_text.trim().is_empty() {
            return Err(AppError::Validation(
                "Report text cannot be empty".to_string(),
            ));
        }
        if self.state == SessionState::Idle || self.state == SessionState::Extracting {
            return Err(AppError::Conflict(
                "There is no extracted report to save yet".to_string(),
            ));
        }

        let path = report_key(&target.folder, report_name);
        self.transition(SessionState::Saving);

        match store.put(&target.bucket, &path, &report_text).await {
            Ok(()) => {
                self.report_text = report_text;
                self.last_error = None;
                self.saved_path = Some(path.clone());
                self.transition(SessionState::Saved);
                Ok(path)
            }
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::warn!(session = %self.id, path = %path, "Save failed: {msg}");
                self.last_error = Some(msg.clone());
                self.transition(SessionState::Failed);
                Err(AppError::Storage(msg))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MemoryStore, ScriptedExtractor};
    use super::*;

    fn target() -> SaveTarget {
        SaveTarget {
            bucket: "orbit-reports-repository".to_string(),
            folder: "trendspot".to_string(),
        }
    }

    fn pdf() -> Document {
        Document::new("report.pdf", b"%PDF-1.4 test".to_vec())
    }

    #[tokio::test]
    async fn test_extraction_accumulates_fragments() {
        let extractor = ScriptedExtractor::new(&["Hello, ", "", "world", "!"]);
        let mut session = ReportSession::new();

        session.start_extraction(&extractor, pdf()).await.unwrap();

        assert_eq!(session.state(), SessionState::Extracted);
        assert_eq!(session.report_text(), "Hello, world!");
        assert_eq!(session.suggested_name(), "Hello_world");

        let calls = extractor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, BASE64.encode(b"%PDF-1.4 test"));
        assert_eq!(calls[0].1, TRENDSPOT_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn test_failure_after_two_fragments_keeps_partial_text() {
        let extractor = ScriptedExtractor::failing_after(&["Nome : ", "Trendspot"]);
        let mut session = ReportSession::new();

        let err = session.start_extraction(&extractor, pdf()).await.unwrap_err();

        assert!(matches!(err, AppError::Extraction(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.report_text(), "Nome : Trendspot");
        assert!(session.view().last_error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_refused_call_fails_with_empty_text() {
        let mut session = ReportSession::new();
        session
            .start_extraction(&ScriptedExtractor::new(&["old text"]), pdf())
            .await
            .unwrap();

        let err = session
            .start_extraction(&ScriptedExtractor::refusing(), pdf())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Extraction(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.report_text(), "");
    }

    #[tokio::test]
    async fn test_failed_extraction_can_be_retried() {
        let mut session = ReportSession::new();
        let _ = session
            .start_extraction(&ScriptedExtractor::failing_after(&["partial"]), pdf())
            .await;
        assert_eq!(session.state(), SessionState::Failed);

        session
            .start_extraction(&ScriptedExtractor::new(&["complete"]), pdf())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Extracted);
        assert_eq!(session.report_text(), "complete");
        assert!(session.view().last_error.is_none());
    }

    #[tokio::test]
    async fn test_observer_receives_fragments() {
        let mut seen = Vec::new();
        let mut session = ReportSession::new();

        session
            .start_extraction_with(&ScriptedExtractor::new(&["a", "", "b"]), pdf(), |f| {
                seen.push(f.to_string())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_save_uploads_once_with_composed_path() {
        let store = MemoryStore::default();
        let mut session = ReportSession::new();
        session
            .start_extraction(&ScriptedExtractor::new(&["draft"]), pdf())
            .await
            .unwrap();

        let path = session
            .save(&store, &target(), "text".to_string(), "report1")
            .await
            .unwrap();

        assert_eq!(path, "trendspot/report1.txt");
        assert_eq!(
            store.puts(),
            vec![(
                "orbit-reports-repository".to_string(),
                "trendspot/report1.txt".to_string(),
                "text".to_string()
            )]
        );
        assert_eq!(session.state(), SessionState::Saved);
        assert_eq!(session.view().saved_path.as_deref(), Some("trendspot/report1.txt"));
    }

    #[tokio::test]
    async fn test_save_before_extraction_is_rejected() {
        let store = MemoryStore::default();
        let mut session = ReportSession::new();

        let err = session
            .save(&store, &target(), "text".to_string(), "report1")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.puts().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.view().saved_path.is_none());
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let mut session = ReportSession::new();
        let snapshot = session.subscribe();
        assert_eq!(snapshot.borrow().state, SessionState::Idle);

        session
            .start_extraction(&ScriptedExtractor::new(&["Nome ", "Trendspot"]), pdf())
            .await
            .unwrap();
        assert_eq!(snapshot.borrow().state, SessionState::Extracted);
        assert_eq!(snapshot.borrow().report_text, "Nome Trendspot");

        session.edit("final".to_string()).unwrap();
        let view = snapshot.borrow().clone();
        assert_eq!(view.state, SessionState::Editing);
        assert_eq!(view.suggested_name, "final");
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected_without_io() {
        let store = MemoryStore::default();
        let mut session = ReportSession::new();
        session
            .start_extraction(&ScriptedExtractor::new(&["texto"]), pdf())
            .await
            .unwrap();

        for name in ["", "   ", "\t"] {
            let err = session
                .save(&store, &target(), "text".to_string(), name)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }

        let err = session
            .save(&store, &target(), String::new(), "name")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(store.puts().is_empty());
        assert_eq!(session.state(), SessionState::Extracted);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_text_for_retry() {
        let mut session = ReportSession::new();
        session
            .start_extraction(&ScriptedExtractor::new(&["original"]), pdf())
            .await
            .unwrap();

        let err = session
            .save(&MemoryStore::failing(), &target(), "edited".to_string(), "r")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.report_text(), "original");

        let store = MemoryStore::default();
        session
            .save(&store, &target(), "edited".to_string(), "r")
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Saved);
        assert_eq!(session.report_text(), "edited");
        assert_eq!(store.puts().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_requires_extracted_text() {
        let mut session = ReportSession::new();
        let err = session.edit("x".to_string()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        session
            .start_extraction(&ScriptedExtractor::new(&["draft"]), pdf())
            .await
            .unwrap();
        session.edit("final".to_string()).unwrap();

        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(session.report_text(), "final");
    }

    #[test]
    fn test_new_session_is_idle() {
        let view = ReportSession::new().view();
        assert_eq!(view.state, SessionState::Idle);
        assert_eq!(view.report_text, "");
        assert_eq!(view.suggested_name, "relatorio_sem_nome");
    }
}
