//! Session Store: transcripts keyed by session id.
//!
//! Each session has its own async turn lock so turns within one session are
//! serialized in arrival order while unrelated sessions proceed in parallel.
//! Transcript reads never wait on an in-flight turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ChatError;

/// Audit entry for one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    /// Parsed arguments, or the raw string when the model sent invalid JSON.
    pub arguments: Value,
    pub output: Value,
    pub is_error: bool,
    /// 1-based tool round within the turn.
    pub round: u32,
    /// Position within the turn, in dispatch order.
    pub position: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    RoundLimitReached,
    UpstreamUnavailable,
}

impl TurnOutcome {
    /// Whether a turn with this outcome is written to the transcript.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, TurnOutcome::UpstreamUnavailable)
    }
}

/// One question, the tool calls made while answering it, and the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub answer: String,
    pub outcome: TurnOutcome,
    pub asked_at: DateTime<Utc>,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub transcript: Vec<Turn>,
}

impl Session {
    fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: now,
            transcript: Vec::new(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }
}

struct SessionSlot {
    data: Mutex<Session>,
    turn_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SessionSlot {
    fn data(&self) -> Result<MutexGuard<'_, Session>, ChatError> {
        self.data
            .lock()
            .map_err(|e| ChatError::Internal(format!("session lock poisoned: {}", e)))
    }

    fn is_busy(&self) -> bool {
        self.turn_lock.try_lock().is_err()
    }
}

/// Exclusive right to run a turn on one session.
///
/// Dropping the guard without calling `commit` leaves the transcript as it
/// was before the turn began.
pub struct TurnGuard {
    id: Uuid,
    slot: Arc<SessionSlot>,
    _permit: OwnedMutexGuard<()>,
}

impl TurnGuard {
    /// Snapshot of the transcript as of the start of this turn.
    pub fn transcript(&self) -> Result<Vec<Turn>, ChatError> {
        Ok(self.slot.data()?.transcript.clone())
    }

    /// Append the finished turn and release the session.
    pub fn commit(self, turn: Turn) -> Result<(), ChatError> {
        let mut session = self.slot.data()?;
        session.transcript.push(turn);
        session.last_activity = Utc::now();
        Ok(())
    }

    /// Empty the transcript and release the session.
    pub fn clear(self) -> Result<(), ChatError> {
        let mut session = self.slot.data()?;
        session.transcript.clear();
        session.last_activity = Utc::now();
        info!(session_id = %self.id, "Session history cleared");
        Ok(())
    }
}

/// Owner of every session and its transcript.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Arc<SessionSlot>>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(session_timeout_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout: Duration::minutes(i64::from(session_timeout_minutes)),
        }
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Arc<SessionSlot>>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Internal(format!("session map lock poisoned: {}", e)))
    }

    pub fn create(&self) -> Result<Uuid, ChatError> {
        let id = Uuid::new_v4();
        let slot = Arc::new(SessionSlot {
            data: Mutex::new(Session::new(id)),
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
        });
        self.map()?.insert(id, slot);
        info!(session_id = %id, "Session created");
        Ok(id)
    }

    /// Look up a live session, dropping it if it has expired.
    fn slot(&self, id: Uuid) -> Result<Arc<SessionSlot>, ChatError> {
        let mut map = self.map()?;
        let slot = map.get(&id).cloned().ok_or(ChatError::SessionNotFound(id))?;
        if !slot.is_busy() && slot.data()?.is_expired(Utc::now(), self.timeout) {
            map.remove(&id);
            debug!(session_id = %id, "Session expired on lookup");
            return Err(ChatError::SessionNotFound(id));
        }
        Ok(slot)
    }

    /// Wait for exclusive turn access to a session.
    ///
    /// Waiters are served in arrival order. Fails with `SessionNotFound` if
    /// the session is deleted while waiting.
    pub async fn begin_turn(&self, id: Uuid) -> Result<TurnGuard, ChatError> {
        let slot = self.slot(id)?;
        let permit = slot.turn_lock.clone().lock_owned().await;

        let still_registered = self
            .map()?
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if !still_registered {
            return Err(ChatError::SessionNotFound(id));
        }

        Ok(TurnGuard {
            id,
            slot,
            _permit: permit,
        })
    }

    /// Append a completed turn, waiting for any in-flight turn to finish.
    pub async fn append(&self, id: Uuid, turn: Turn) -> Result<(), ChatError> {
        self.begin_turn(id).await?.commit(turn)
    }

    /// Snapshot of a session including its transcript.
    pub fn get(&self, id: Uuid) -> Result<Session, ChatError> {
        let slot = self.slot(id)?;
        let session = slot.data()?.clone();
        Ok(session)
    }

    pub fn history(&self, id: Uuid) -> Result<Vec<Turn>, ChatError> {
        Ok(self.get(id)?.transcript)
    }

    /// Empty the transcript; the session itself stays.
    ///
    /// Waits behind any in-flight turn, so a turn either lands before the
    /// clear or starts from the emptied transcript.
    pub async fn clear(&self, id: Uuid) -> Result<(), ChatError> {
        self.begin_turn(id).await?.clear()
    }

    pub fn delete(&self, id: Uuid) -> Result<(), ChatError> {
        match self.map()?.remove(&id) {
            Some(_) => {
                info!(session_id = %id, "Session deleted");
                Ok(())
            }
            None => Err(ChatError::SessionNotFound(id)),
        }
    }

    /// Remove every idle session past its timeout. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut map = match self.map() {
            Ok(m) => m,
            Err(e) => {
                error!("Session purge skipped: {}", e);
                return 0;
            }
        };
        let now = Utc::now();
        let before = map.len();
        map.retain(|_, slot| {
            slot.is_busy()
                || slot
                    .data()
                    .map(|s| !s.is_expired(now, self.timeout))
                    .unwrap_or(false)
        });
        let removed = before - map.len();
        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.map().map(|m| m.len()).unwrap_or(0)
    }

    #[cfg(test)]
    fn backdate(&self, id: Uuid, by: Duration) {
        let map = self.map().unwrap();
        let mut session = map[&id].data().unwrap();
        session.last_activity = session.last_activity - by;
    }
}
