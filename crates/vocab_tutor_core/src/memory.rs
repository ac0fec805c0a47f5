//! crates/vocab_tutor_core/src/memory.rs
//!
//! An in-process `ConversationStore`. One lock guards all state, so every
//! operation, including a turn commit, is applied atomically.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Session, User};
use crate::ports::{ConversationStore, PortError, PortResult};
use crate::progress::{plan_progress, trace_decision, ProgressClaim, ProgressDecision, TrackedWord};
use crate::turn::{apply_turn, CommitReport, TurnCommit};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    user_ids_by_name: HashMap<String, Uuid>,
    sessions: HashMap<Uuid, Session>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn session_not_found(session_id: Uuid) -> PortError {
    PortError::NotFound(format!("Session {} not found", session_id))
}

fn user_not_found(user_id: Uuid) -> PortError {
    PortError::NotFound(format!("User {} not found", user_id))
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_or_create_user(
        &self,
        name: &str,
        source_language: &str,
        target_language: &str,
    ) -> PortResult<User> {
        let mut state = self.state.lock().await;
        if let Some(user_id) = state.user_ids_by_name.get(name).copied() {
            let user = state
                .users
                .get_mut(&user_id)
                .ok_or_else(|| user_not_found(user_id))?;
            user.source_language = source_language.to_string();
            user.target_language = target_language.to_string();
            return Ok(user.clone());
        }

        let user = User::new(name, source_language, target_language);
        state.user_ids_by_name.insert(name.to_string(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        initial_assistant_message: &str,
    ) -> PortResult<Session> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(user_not_found(user_id));
        }
        let session = Session::new(user_id, initial_assistant_message);
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<Session> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn append_turn(
        &self,
        session_id: Uuid,
        user_message: &str,
        assistant_raw: &str,
    ) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        session.append_turn(None, user_message, assistant_raw);
        Ok(())
    }

    async fn merge_word_progress(
        &self,
        user_id: Uuid,
        claim: &ProgressClaim,
    ) -> PortResult<ProgressDecision> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;
        let tracked = TrackedWord::from_user(user);
        let decision = plan_progress(user, tracked.as_ref(), claim);
        if let ProgressDecision::Apply(change) = &decision {
            user.apply_progress(change);
        }
        trace_decision(user_id, &decision);
        Ok(decision)
    }

    async fn commit_turn(&self, turn: &TurnCommit) -> PortResult<CommitReport> {
        let mut state = self.state.lock().await;
        let mut session = state
            .sessions
            .get(&turn.session_id)
            .cloned()
            .ok_or_else(|| session_not_found(turn.session_id))?;
        let mut user = state
            .users
            .get(&session.user_id)
            .cloned()
            .ok_or_else(|| user_not_found(session.user_id))?;

        let report = apply_turn(&mut session, &mut user, turn);

        state.users.insert(user.id, user);
        state.sessions.insert(session.id, session);
        Ok(report)
    }
}
