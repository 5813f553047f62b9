use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::{Assistant, SubmitOutcome};
use crate::models::{ChatMessage, Role};

/// Open sessions before idle ones are swept.
const SWEEP_THRESHOLD: usize = 1024;

/// Append-only conversation log of one session.
///
/// Clones share the same log, so a reader can copy it out while a command
/// holds the session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Arc<Mutex<Vec<ChatMessage>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, role: Role, content: impl Into<String>) {
        self.messages
            .lock()
            .expect("transcript lock poisoned")
            .push(ChatMessage::new(role, content));
    }

    /// Snapshot of the log in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().expect("transcript lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("transcript lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages written by `role`.
    pub fn count(&self, role: Role) -> usize {
        self.messages
            .lock()
            .expect("transcript lock poisoned")
            .iter()
            .filter(|m| m.role == role)
            .count()
    }
}

/// Everything the assistant remembers about one conversation.
///
/// Created empty with no rate-gate timestamp; dropped when the session ends.
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    user_id: Option<Uuid>,
    transcript: Transcript,
    last_accepted: Option<Instant>,
}

impl SessionState {
    /// `user_id` is the signed-in user, or `None` for an anonymous visitor.
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            transcript: Transcript::new(),
            last_accepted: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    pub(crate) fn mark_accepted(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    pub(crate) fn record(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(role, content);
    }
}

/// Shared handle to a session, used when several callers may submit to it.
///
/// While a command runs the session is busy and further submissions are
/// ignored rather than queued. The transcript stays readable throughout.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    state: Arc<tokio::sync::Mutex<SessionState>>,
    transcript: Transcript,
    last_used: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    pub fn new(state: SessionState) -> Self {
        Self {
            id: state.id(),
            transcript: state.transcript().clone(),
            state: Arc::new(tokio::sync::Mutex::new(state)),
            last_used: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn submit(&self, assistant: &Assistant, text: &str) -> SubmitOutcome {
        self.touch(Instant::now());
        let Ok(mut state) = self.state.try_lock() else {
            tracing::debug!(session_id = %self.id, "Session busy, ignoring submission");
            return SubmitOutcome::Ignored;
        };
        assistant.submit(&mut state, text).await
    }

    /// Transcript so far, without waiting for a running command.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript.messages()
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().expect("session clock lock poisoned")
    }

    fn touch(&self, now: Instant) {
        *self.last_used.lock().expect("session clock lock poisoned") = now;
    }
}

/// Open sessions keyed by id.
///
/// Sessions idle for longer than the TTL are dropped once the registry holds
/// more than a thousand of them.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    pub fn open(&self, user_id: Option<Uuid>) -> SessionHandle {
        let handle = SessionHandle::new(SessionState::new(user_id));
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        if sessions.len() > SWEEP_THRESHOLD {
            let swept = sweep(&mut sessions, self.idle_ttl, Instant::now());
            tracing::debug!(swept, "Dropped idle assistant sessions");
        }
        sessions.insert(handle.id(), handle.clone());
        tracing::debug!(session_id = %handle.id(), "Opened assistant session");
        handle
    }

    pub fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let handle = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .get(&id)
            .cloned()?;
        handle.touch(Instant::now());
        Some(handle)
    }

    /// Drop a session and its transcript. Returns false if it did not exist.
    pub fn close(&self, id: Uuid) -> bool {
        let removed = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(session_id = %id, "Closed assistant session");
        }
        removed
    }

    /// Drop every session unused for at least the TTL as of `now`. Returns
    /// how many were dropped.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        sweep(&mut sessions, self.idle_ttl, now)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(sessions: &mut HashMap<Uuid, SessionHandle>, ttl: Duration, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|_, handle| now.saturating_duration_since(handle.last_used()) < ttl);
    before - sessions.len()
}
