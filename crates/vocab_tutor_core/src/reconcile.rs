//! crates/vocab_tutor_core/src/reconcile.rs
//!
//! Deferred reconciliation of streamed replies into the conversation store.
//!
//! Turns are handed to a background dispatcher in the order their streams
//! finish. Each turn runs on its own task, chained behind the previous turn of
//! the same session, so sessions commit independently while one session's
//! turns stay in order. A task parses the buffered reply, commits it through
//! the store and only then releases the session's lease, so the next turn of
//! the same session cannot start before this one is recorded. Failures are
//! logged here and never reach the learner, who already has the streamed
//! content.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::envelope::{Envelope, EnvelopeError};
use crate::orchestrator::SessionLease;
use crate::ports::{ConversationStore, PortError};
use crate::progress::trace_decision;
use crate::turn::{CommitReport, TurnCommit};

/// The buffered output of one streamed turn.
#[derive(Debug, Clone)]
pub struct TurnBuffer {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub system_prompt: Option<String>,
    pub user_message: String,
    pub buffer: String,
    /// Set when the stream ended with the gateway's error fragment.
    pub error_tainted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Committed(CommitReport),
    SkippedEmpty,
    SkippedStreamError,
    SkippedMalformed(EnvelopeError),
    Failed(PortError),
}

/// Reconciles one turn. Every skip and failure is logged; nothing is raised.
pub async fn reconcile_turn(store: &dyn ConversationStore, turn: TurnBuffer) -> ReconcileOutcome {
    let session_id = turn.session_id;

    if turn.buffer.trim().is_empty() {
        warn!(%session_id, "Model produced no output. Turn commit skipped.");
        return ReconcileOutcome::SkippedEmpty;
    }
    if turn.error_tainted {
        warn!(%session_id, "Stream ended with an error fragment. Turn commit skipped.");
        return ReconcileOutcome::SkippedStreamError;
    }

    let envelope = match Envelope::parse(&turn.buffer) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%session_id, error = %e, "Reply is not a well-formed envelope. Turn commit skipped.");
            return ReconcileOutcome::SkippedMalformed(e);
        }
    };

    let commit = TurnCommit {
        session_id,
        system_prompt: turn.system_prompt,
        user_message: turn.user_message,
        assistant_raw: turn.buffer,
        envelope,
    };
    match store.commit_turn(&commit).await {
        Ok(report) => {
            trace_decision(turn.user_id, &report.progress);
            info!(%session_id, history_len = report.history_len, "Turn committed.");
            ReconcileOutcome::Committed(report)
        }
        Err(e) => {
            error!(%session_id, error = %e, "Failed to commit turn.");
            ReconcileOutcome::Failed(e)
        }
    }
}

struct Job {
    turn: TurnBuffer,
    lease: Option<SessionLease>,
}

struct QueueProgress {
    submitted: AtomicU64,
    finished: watch::Sender<u64>,
}

/// Handle to the reconciliation dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct Reconciler {
    jobs: mpsc::UnboundedSender<Job>,
    progress: Arc<QueueProgress>,
}

impl Reconciler {
    /// Spawns the dispatcher on the current Tokio runtime.
    pub fn spawn(store: Arc<dyn ConversationStore>) -> (Self, JoinHandle<()>) {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let (finished, _) = watch::channel(0u64);
        let progress = Arc::new(QueueProgress {
            submitted: AtomicU64::new(0),
            finished,
        });

        let worker_progress = progress.clone();
        let handle = tokio::spawn(async move {
            // Last queued task per session; a new turn waits for it first.
            let mut tails: HashMap<Uuid, JoinHandle<()>> = HashMap::new();
            while let Some(job) = rx.recv().await {
                tails.retain(|_, tail| !tail.is_finished());
                let session_id = job.turn.session_id;
                let previous = tails.remove(&session_id);
                let store = store.clone();
                let progress = worker_progress.clone();
                let task = tokio::spawn(async move {
                    if let Some(previous) = previous {
                        if let Err(e) = previous.await {
                            error!(%session_id, error = %e, "Previous reconciliation task failed.");
                        }
                    }
                    reconcile_turn(store.as_ref(), job.turn).await;
                    drop(job.lease);
                    progress.finished.send_modify(|n| *n += 1);
                });
                tails.insert(session_id, task);
            }
            info!("Reconciliation dispatcher stopped.");
        });

        (Self { jobs, progress }, handle)
    }

    /// Queues a turn. The lease, if any, is released once the turn is handled.
    pub fn submit(&self, turn: TurnBuffer, lease: Option<SessionLease>) {
        self.progress.submitted.fetch_add(1, Ordering::SeqCst);
        if let Err(rejected) = self.jobs.send(Job { turn, lease }) {
            self.progress.submitted.fetch_sub(1, Ordering::SeqCst);
            error!(
                session_id = %rejected.0.turn.session_id,
                "Reconciliation dispatcher is gone; turn dropped."
            );
        }
    }

    /// Resolves once every turn submitted before the call has been handled.
    pub async fn wait_idle(&self) {
        let target = self.progress.submitted.load(Ordering::SeqCst);
        let mut finished = self.progress.finished.subscribe();
        // An error means the dispatcher is gone and nothing more will finish.
        let _ = finished.wait_for(|n| *n >= target).await;
    }
}
