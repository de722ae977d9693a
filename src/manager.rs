use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::session::{DisconnectReason, Session};

/// Aggregate connection statistics, mirroring the original manager's
/// `get_connection_stats`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub subjects_connected: usize,
    pub sessions_by_agent: HashMap<String, usize>,
}

struct Entry {
    session: Arc<Mutex<Session>>,
    to_client: tokio::sync::mpsc::UnboundedSender<Value>,
}

/// Tracks every live session, indexed both by session id and by subject
/// id, so a subject's sessions can be enumerated or broadcast to without
/// scanning the whole table.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Entry>>,
    subject_sessions: RwLock<HashMap<String, HashSet<String>>>,
    initialized_subjects: RwLock<HashSet<String>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            subject_sessions: RwLock::new(HashMap::new()),
            initialized_subjects: RwLock::new(HashSet::new()),
        }
    }

    /// Registers a new session, returning the shared session handle and
    /// a channel the caller can use to push frames to this session's
    /// client socket (used by `broadcast_to_subject`).
    pub async fn accept(
        &self,
        subject_id: Option<String>,
    ) -> (Arc<Mutex<Session>>, tokio::sync::mpsc::UnboundedReceiver<Value>) {
        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(Session::new(session_id.clone(), subject_id.clone())));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        self.sessions.write().await.insert(
            session_id.clone(),
            Entry {
                session: session.clone(),
                to_client: tx,
            },
        );
        if let Some(subject_id) = &subject_id {
            self.subject_sessions
                .write()
                .await
                .entry(subject_id.clone())
                .or_default()
                .insert(session_id.clone());
        }

        tracing::info!(target: "manager", session_id = %session_id, subject_id = ?subject_id, "session accepted");
        (session, rx)
    }

    /// Runs subject-scoped, one-time initialization exactly once per
    /// subject for the lifetime of this manager. Simplified from the
    /// original's reinitialize-on-customer-change branch since a
    /// session's subject never changes after accept.
    pub async fn ensure_initialized<F>(&self, subject_id: &str, init: F)
    where
        F: std::future::Future<Output = ()>,
    {
        {
            let guard = self.initialized_subjects.read().await;
            if guard.contains(subject_id) {
                return;
            }
        }
        let mut guard = self.initialized_subjects.write().await;
        if guard.contains(subject_id) {
            return;
        }
        init.await;
        guard.insert(subject_id.to_string());
    }

    /// Removes a session from the index and stamps its final state.
    /// Returns the session's data so the caller can hand it off to the
    /// conversation logger.
    pub async fn teardown(&self, session_id: &str, reason: DisconnectReason, graceful: bool) -> Option<Session> {
        let entry = self.sessions.write().await.remove(session_id)?;
        if let Some(subject_id) = {
            let guard = entry.session.lock().await;
            guard.subject_id.clone()
        } {
            let mut subjects = self.subject_sessions.write().await;
            if let Some(set) = subjects.get_mut(&subject_id) {
                set.remove(session_id);
                if set.is_empty() {
                    subjects.remove(&subject_id);
                }
            }
        }

        let mut session = entry.session.lock().await;
        session.end_at = Some(chrono::Utc::now());
        if session.disconnect_reason.is_none() {
            session.disconnect_reason = Some(reason);
        }
        session.graceful = graceful;
        tracing::info!(target: "manager", session_id = %session_id, reason = ?reason, "session torn down");
        Some(session.clone())
    }

    /// Best-effort push to every session belonging to a subject. Returns
    /// the number of sessions the frame was queued for.
    pub async fn broadcast_to_subject(&self, subject_id: &str, message: Value) -> usize {
        let session_ids: Vec<String> = self
            .subject_sessions
            .read()
            .await
            .get(subject_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for session_id in session_ids {
            if let Some(entry) = sessions.get(&session_id) {
                if entry.to_client.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn stats(&self) -> ConnectionStats {
        let sessions = self.sessions.read().await;
        let mut sessions_by_agent: HashMap<String, usize> = HashMap::new();
        for entry in sessions.values() {
            let agent = entry.session.lock().await.active_agent_id.clone();
            *sessions_by_agent.entry(agent).or_insert(0) += 1;
        }
        ConnectionStats {
            total_connections: sessions.len(),
            subjects_connected: self.subject_sessions.read().await.len(),
            sessions_by_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_indexes_session_by_subject() {
        let manager = SessionManager::new();
        let (_session, _rx) = manager.accept(Some("c42".to_string())).await;
        let stats = manager.stats().await;
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.subjects_connected, 1);
    }

    #[tokio::test]
    async fn ensure_initialized_runs_init_exactly_once_per_subject() {
        let manager = SessionManager::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            manager
                .ensure_initialized("c42", async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })
                .await;
        }

        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn teardown_removes_session_and_stamps_disconnect_reason() {
        let manager = SessionManager::new();
        let (session_arc, _rx) = manager.accept(Some("c42".to_string())).await;
        let session_id = session_arc.lock().await.id.clone();

        let session = manager.teardown(&session_id, DisconnectReason::ClientClosed, true).await.unwrap();
        assert_eq!(session.disconnect_reason, Some(DisconnectReason::ClientClosed));
        assert!(session.graceful);
        assert!(session.end_at.is_some());

        let stats = manager.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.subjects_connected, 0);
    }

    #[tokio::test]
    async fn teardown_does_not_overwrite_an_already_set_disconnect_reason() {
        let manager = SessionManager::new();
        let (session_arc, _rx) = manager.accept(None).await;
        {
            let mut guard = session_arc.lock().await;
            guard.disconnect_reason = Some(DisconnectReason::AuthFailed);
        }
        let session_id = session_arc.lock().await.id.clone();
        let session = manager.teardown(&session_id, DisconnectReason::InternalError, false).await.unwrap();
        assert_eq!(session.disconnect_reason, Some(DisconnectReason::AuthFailed));
    }

    #[tokio::test]
    async fn broadcast_to_subject_delivers_to_every_session_for_that_subject() {
        let manager = SessionManager::new();
        let (_s1, mut rx1) = manager.accept(Some("c42".to_string())).await;
        let (_s2, mut rx2) = manager.accept(Some("c42".to_string())).await;

        let delivered = manager.broadcast_to_subject("c42", serde_json::json!({"type": "ping"})).await;
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
