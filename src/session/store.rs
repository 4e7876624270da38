use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::{ReportSession, SessionView};

pub type SessionHandle = Arc<Mutex<ReportSession>>;

struct SessionEntry {
    handle: SessionHandle,
    snapshot: watch::Receiver<SessionView>,
}

/// In-memory registry of report sessions.
///
/// Each session sits behind its own async mutex. Callers take it with
/// [`acquire`](Self::acquire), which refuses instead of waiting while another
/// request holds the session. [`snapshot`](Self::snapshot) reads the last
/// published view without the lock.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> SessionHandle {
        let session = ReportSession::new();
        let id = session.id();
        let snapshot = session.subscribe();
        let handle = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(
            id,
            SessionEntry {
                handle: handle.clone(),
                snapshot,
            },
        );
        tracing::info!(session = %id, "Session created");
        handle
    }

    pub async fn get(&self, id: &Uuid) -> Result<SessionHandle, AppError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(not_found)
    }

    /// Latest view of a session, even while another request holds it.
    pub async fn snapshot(&self, id: &Uuid) -> Result<SessionView, AppError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| entry.snapshot.borrow().clone())
            .ok_or_else(not_found)
    }

    /// Locks a session for exclusive use by one request.
    pub async fn acquire(&self, id: &Uuid) -> Result<OwnedMutexGuard<ReportSession>, AppError> {
        let handle = self.get(id).await?;
        handle
            .try_lock_owned()
            .map_err(|_| AppError::Conflict("Session is busy with another operation".to_string()))
    }

    pub async fn remove(&self, id: &Uuid) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| tracing::info!(session = %id, "Session removed"))
            .ok_or_else(not_found)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Session not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SessionStore::new();
        let id = store.create().await.lock().await.id();

        let session = store.acquire(&id).await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::new();
        let err = store.acquire(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(matches!(
            store.snapshot(&Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_busy_session_is_refused() {
        let store = SessionStore::new();
        let id = store.create().await.lock().await.id();

        let _held = store.acquire(&id).await.unwrap();
        let err = store.acquire(&id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_snapshot_is_readable_while_held() {
        let store = SessionStore::new();
        let id = store.create().await.lock().await.id();

        let mut held = store.acquire(&id).await.unwrap();
        held.transition(SessionState::Extracting);

        let view = store.snapshot(&id).await.unwrap();
        assert_eq!(view.id, id);
        assert_eq!(view.state, SessionState::Extracting);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new();
        let id = store.create().await.lock().await.id();

        store.remove(&id).await.unwrap();
        assert!(store.get(&id).await.is_err());
        assert!(matches!(store.remove(&id).await, Err(AppError::NotFound(_))));
    }
}
