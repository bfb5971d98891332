//! Per-user conversation sessions.
//!
//! Sessions live in process memory only. A restart drops every draft, and
//! users simply register again from `/start`.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::profile::{ProfileDraft, UserId};
use crate::sync::{KeyGuard, KeyedLocks};

use super::state::ConversationState;

/// Where a user is in the conversation, plus uncommitted registration answers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub state: ConversationState,
    pub draft: ProfileDraft,
}

impl Session {
    /// Drop the draft and move to `state`.
    pub fn reset_to(&mut self, state: ConversationState) {
        self.state = state;
        self.draft = ProfileDraft::default();
    }
}

/// Owns all sessions and serializes access per user.
///
/// Callers `checkout` a session, work on a copy, and `commit` it. A lease
/// dropped without commit leaves the stored session exactly as it was,
/// which is how a failed store call keeps the pre-operation state.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<UserId, Session>>,
    locks: KeyedLocks<UserId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other event for `user_id` is in flight, then hand out
    /// a working copy of the session.
    pub async fn checkout(&self, user_id: UserId) -> SessionLease<'_> {
        let guard = self.locks.lock(user_id).await;
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        SessionLease {
            owner: self,
            _guard: guard,
            user_id,
            session,
        }
    }

    /// Current state without taking the user's lock.
    pub fn state(&self, user_id: UserId) -> ConversationState {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Number of sessions held in memory.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, user_id: UserId, session: Session) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        // Ended sessions hold nothing worth keeping.
        if session.state.is_terminal() || session == Session::default() {
            sessions.remove(&user_id);
        } else {
            sessions.insert(user_id, session);
        }
    }
}

/// Exclusive working copy of one user's session.
pub struct SessionLease<'a> {
    owner: &'a SessionManager,
    _guard: KeyGuard<'a, UserId>,
    user_id: UserId,
    session: Session,
}

impl SessionLease<'_> {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Write the working copy back and release the user.
    pub fn commit(self) {
        debug!(user_id = %self.user_id, state = %self.session.state, "Session committed");
        self.owner.store(self.user_id, self.session);
    }
}
