//! crates/vocab_tutor_core/src/orchestrator.rs
//!
//! The session orchestrator: opens sessions with a greeting, and drives one
//! streamed turn at a time per session, relaying fragments to the caller while
//! buffering them for deferred reconciliation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ChatMessage;
use crate::gateway::parse_error_fragment;
use crate::greeting::greet;
use crate::ports::{CompletionService, ConversationStore, FragmentStream, PortResult};
use crate::prompt::PromptTemplate;
use crate::reconcile::{Reconciler, TurnBuffer};

/// Exclusive right to run a turn on one session. Dropping it lets the next
/// turn of that session proceed.
pub type SessionLease = OwnedMutexGuard<()>;

/// One async lock per session id.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: Uuid) -> SessionLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on are only referenced by the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(session_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Returned by [`Tutor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub session_id: Uuid,
    pub greeting: String,
}

pub struct Tutor {
    store: Arc<dyn ConversationStore>,
    completions: Arc<dyn CompletionService>,
    prompt: PromptTemplate,
    reconciler: Reconciler,
    locks: SessionLocks,
}

impl Tutor {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        completions: Arc<dyn CompletionService>,
        prompt: PromptTemplate,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            store,
            completions,
            prompt,
            reconciler,
            locks: SessionLocks::default(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Finds or creates the learner and opens a new session greeting them.
    pub async fn start(
        &self,
        user_name: &str,
        source_language: &str,
        target_language: &str,
    ) -> PortResult<SessionStart> {
        let user = self
            .store
            .find_or_create_user(user_name, source_language, target_language)
            .await?;
        let greeting = greet(
            &user.name,
            &user.target_language,
            &user.word_initiated,
            &user.word_progress,
        );
        let session = self.store.create_session(user.id, &greeting).await?;
        info!(session_id = %session.id, user_id = %user.id, "Session started.");

        Ok(SessionStart {
            session_id: session.id,
            greeting,
        })
    }

    /// Sends the learner's message to the model and returns the reply stream.
    ///
    /// Errors returned here happen before any fragment exists. Once the stream
    /// is handed out, its buffer is reconciled when it ends or is dropped.
    pub async fn continue_session(
        &self,
        session_id: Uuid,
        user_message: String,
    ) -> PortResult<FragmentStream> {
        let lease = self.locks.acquire(session_id).await;

        let session = self.store.get_session_by_id(session_id).await?;
        let mut history = session.message_history.clone();
        history.push(ChatMessage::user(user_message.as_str()));

        let system_prompt = if session.has_system_prompt() {
            None
        } else {
            let user = self.store.get_user_by_id(session.user_id).await?;
            let prompt = self.prompt.render(&user);
            history.insert(0, ChatMessage::system(prompt.as_str()));
            Some(prompt)
        };

        let upstream = self.completions.stream_completion(&history).await?;
        debug!(%session_id, messages = history.len(), "Upstream completion started.");

        let recorder = TurnRecorder {
            reconciler: self.reconciler.clone(),
            lease: Some(lease),
            turn: Some(TurnBuffer {
                session_id,
                user_id: session.user_id,
                system_prompt,
                user_message,
                buffer: String::new(),
                error_tainted: false,
            }),
        };
        Ok(relay(upstream, recorder))
    }
}

/// Relays fragments unchanged, in order, stopping after an error fragment.
fn relay(mut upstream: FragmentStream, mut recorder: TurnRecorder) -> FragmentStream {
    Box::pin(async_stream::stream! {
        while let Some(fragment) = upstream.next().await {
            recorder.push(&fragment);
            if let Some(error) = parse_error_fragment(&fragment) {
                warn!(error = %error.error, detail = %error.detail, "Model stream yielded an error fragment.");
                recorder.mark_error();
                yield fragment;
                break;
            }
            yield fragment;
        }
        recorder.finish();
    })
}

/// Owns a turn's buffer and lease until they are handed to the reconciler,
/// whether the stream completes or the caller drops it midway.
struct TurnRecorder {
    reconciler: Reconciler,
    lease: Option<SessionLease>,
    turn: Option<TurnBuffer>,
}

impl TurnRecorder {
    fn push(&mut self, fragment: &str) {
        if let Some(turn) = self.turn.as_mut() {
            turn.buffer.push_str(fragment);
        }
    }

    fn mark_error(&mut self) {
        if let Some(turn) = self.turn.as_mut() {
            turn.error_tainted = true;
        }
    }

    fn finish(&mut self) {
        let Some(turn) = self.turn.take() else {
            return;
        };
        if turn.buffer.is_empty() {
            warn!(session_id = %turn.session_id, "Model produced no output. Reconciliation skipped.");
            self.lease.take();
            return;
        }
        info!(session_id = %turn.session_id, bytes = turn.buffer.len(), "Model stream finished. Scheduling reconciliation.");
        self.reconciler.submit(turn, self.lease.take());
    }
}

impl Drop for TurnRecorder {
    fn drop(&mut self) {
        if self.turn.is_some() {
            debug!("Reply stream dropped before completion; reconciling the partial buffer.");
            self.finish();
        }
    }
}
