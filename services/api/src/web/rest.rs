//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the session endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{
    ContinueSessionRequest, ErrorResponse, StartSessionRequest, StartSessionResponse,
};
use crate::web::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Json},
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        start_session_handler,
        continue_session_handler,
        crate::web::speech::speech_handler,
    ),
    components(
        schemas(StartSessionRequest, StartSessionResponse, ContinueSessionRequest, ErrorResponse)
    ),
    tags(
        (name = "Vocabulary Tutor API", description = "Conversational vocabulary lessons streamed from a language model.")
    )
)]
pub struct ApiDoc;

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start a new tutoring session.
///
/// Creates the learner on first use (or updates their language pair) and
/// returns a greeting chosen from their recorded progress.
#[utoipa::path(
    post,
    path = "/session/start",
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session created", body = StartSessionResponse),
        (status = 400, description = "A required field is empty", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    require_text("user_name", &payload.user_name)?;
    require_text("source_language", &payload.source_language)?;
    require_text("target_language", &payload.target_language)?;

    let start = app_state
        .tutor
        .start(
            payload.user_name.trim(),
            payload.source_language.trim(),
            payload.target_language.trim(),
        )
        .await?;

    Ok(Json(StartSessionResponse {
        session_id: start.session_id,
        greeting: start.greeting,
    }))
}

/// Send a learner message and stream the tutor's reply.
///
/// The body is the model's JSON reply, relayed chunk by chunk as it is
/// generated. A failure after streaming has begun arrives as a final
/// `{"error": ..., "detail": ...}` chunk rather than as an HTTP error.
#[utoipa::path(
    post,
    path = "/session/continue",
    request_body = ContinueSessionRequest,
    responses(
        (status = 200, description = "Streamed JSON reply", content_type = "application/json", body = String),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn continue_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ContinueSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fragments = app_state
        .tutor
        .continue_session(payload.session_id, payload.user_message)
        .await?;
    info!(session_id = %payload.session_id, "Streaming reply.");

    let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));
    Ok(([(CONTENT_TYPE, "application/json")], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::{router, speech::SpeechCache};
    use async_trait::async_trait;
    use axum::http::{Request, StatusCode};
    use futures::stream;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use vocab_tutor_core::ports::{
        CompletionService, ConversationStore, FragmentStream, PortResult, TextToSpeechService,
    };
    use vocab_tutor_core::{ChatMessage, MemoryStore, PromptTemplate, Reconciler, Tutor};

    const REPLY: &str = r#"{"response":"Choisis une catégorie !","currentCategory":null,"currentWord":null,"currentWordProgress":null,"exercises":null}"#;

    struct FixedReply;

    #[async_trait]
    impl CompletionService for FixedReply {
        async fn stream_completion(&self, _history: &[ChatMessage]) -> PortResult<FragmentStream> {
            let (head, tail) = REPLY.split_at(20);
            Ok(Box::pin(stream::iter(vec![head.to_string(), tail.to_string()])))
        }
    }

    struct Silent;

    #[async_trait]
    impl TextToSpeechService for Silent {
        async fn generate_audio(&self, _text: &str) -> PortResult<Vec<u8>> {
            Ok(vec![0xFF, 0xFB])
        }
    }

    async fn app(store: Arc<MemoryStore>) -> (tempfile::TempDir, Arc<AppState>, axum::Router) {
        let (reconciler, _handle) = Reconciler::spawn(store.clone());
        let tutor = Tutor::new(store, Arc::new(FixedReply), PromptTemplate::default(), reconciler);
        let dir = tempfile::tempdir().unwrap();
        let speech = SpeechCache::new(dir.path().to_path_buf(), Arc::new(Silent))
            .await
            .unwrap();
        let state = Arc::new(AppState {
            tutor: Arc::new(tutor),
            speech: Arc::new(speech),
        });
        (dir, state.clone(), router(state))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_start_then_continue_streams_reply_and_commits() {
        let store = Arc::new(MemoryStore::new());
        let (_dir, state, app) = app(store.clone()).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/session/start",
                serde_json::json!({"user_name": "Aria", "source_language": "English", "target_language": "French"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let start: StartSessionResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(start.greeting.contains("Aria"));

        let response = app
            .oneshot(post_json(
                "/session/continue",
                serde_json::json!({"session_id": start.session_id, "user_message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_bytes(response).await, REPLY.as_bytes());

        state.tutor.reconciler().wait_idle().await;
        let session = store.get_session_by_id(start.session_id).await.unwrap();
        assert_eq!(session.message_history.len(), 4);
    }

    #[tokio::test]
    async fn test_continue_unknown_session_is_404() {
        let (_dir, _state, app) = app(Arc::new(MemoryStore::new())).await;
        let response = app
            .oneshot(post_json(
                "/session/continue",
                serde_json::json!({"session_id": uuid::Uuid::new_v4(), "user_message": "hello"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(error.message.contains("not found"));
    }

    #[tokio::test]
    async fn test_start_rejects_blank_name() {
        let (_dir, _state, app) = app(Arc::new(MemoryStore::new())).await;
        let response = app
            .oneshot(post_json(
                "/session/start",
                serde_json::json!({"user_name": "  ", "source_language": "English", "target_language": "French"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_speech_route_serves_mpeg() {
        let (_dir, _state, app) = app(Arc::new(MemoryStore::new())).await;
        let response = app
            .oneshot(Request::get("/speech/Baguette").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "audio/mpeg");
        assert_eq!(body_bytes(response).await, vec![0xFF, 0xFB]);
    }
}
