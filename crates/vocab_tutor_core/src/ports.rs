//! crates/vocab_tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the tutor's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the language model vendor and the speech engine.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::domain::{ChatMessage, Session, User};
use crate::progress::{ProgressClaim, ProgressDecision};
use crate::turn::{CommitReport, TurnCommit};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Text fragments of one model reply, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable owner of users, sessions, message histories and progress maps.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    // --- Users ---
    /// Looks a user up by unique name, updating the language pair when found
    /// and creating an empty profile otherwise. Safe under concurrent calls.
    async fn find_or_create_user(
        &self,
        name: &str,
        source_language: &str,
        target_language: &str,
    ) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    // --- Sessions ---
    /// Always creates a new session whose history holds only the greeting.
    async fn create_session(
        &self,
        user_id: Uuid,
        initial_assistant_message: &str,
    ) -> PortResult<Session>;

    async fn get_session_by_id(&self, session_id: Uuid) -> PortResult<Session>;

    // --- Turns and Progress ---
    /// Appends one user record and one assistant record.
    async fn append_turn(
        &self,
        session_id: Uuid,
        user_message: &str,
        assistant_raw: &str,
    ) -> PortResult<()>;

    /// Validates a claimed stage against the recorded one and writes it on accept.
    /// A rejection leaves the profile untouched and is reported, not raised.
    async fn merge_word_progress(
        &self,
        user_id: Uuid,
        claim: &ProgressClaim,
    ) -> PortResult<ProgressDecision>;

    /// Applies the history append and the validated progress update of one
    /// turn as a single atomic unit.
    async fn commit_turn(&self, turn: &TurnCommit) -> PortResult<CommitReport>;
}

/// The external language model, seen as a source of reply fragments.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Starts one upstream call for `history`.
    ///
    /// An `Err` means the call could not be set up at all. Once a stream is
    /// returned, transport failures arrive in-band as a single final error
    /// fragment (see [`crate::gateway`]).
    async fn stream_completion(&self, history: &[ChatMessage]) -> PortResult<FragmentStream>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}
