pub mod protocol;
pub mod rest;
pub mod speech;
pub mod state;

pub use rest::{continue_session_handler, start_session_handler};
pub use speech::speech_handler;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// Builds the API routes over the shared state.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/session/start", post(start_session_handler))
        .route("/session/continue", post(continue_session_handler))
        .route("/speech/{word}", get(speech_handler))
        .with_state(app_state)
}
