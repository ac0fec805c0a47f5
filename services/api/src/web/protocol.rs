//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Payloads Sent FROM the Client TO the Server
//=========================================================================================

/// Opens a new tutoring session for a learner, creating the learner on first use.
#[derive(Deserialize, Debug, ToSchema)]
pub struct StartSessionRequest {
    /// Unique learner name.
    pub user_name: String,
    /// The learner's native language.
    pub source_language: String,
    /// The language being learned.
    pub target_language: String,
}

/// Sends one learner message within an existing session.
#[derive(Deserialize, Debug, ToSchema)]
pub struct ContinueSessionRequest {
    pub session_id: Uuid,
    pub user_message: String,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub greeting: String,
}

/// Body of every non-streamed error response.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
