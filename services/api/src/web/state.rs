//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use crate::web::speech::SpeechCache;
use std::sync::Arc;
use vocab_tutor_core::Tutor;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tutor: Arc<Tutor>,
    pub speech: Arc<SpeechCache>,
}
