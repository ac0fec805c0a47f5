//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, tts::parse_voice, OpenAiTtsAdapter, OpenAiTutorAdapter},
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, speech::SpeechCache, state::AppState},
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use vocab_tutor_core::{PromptTemplate, Reconciler, Tutor};

/// Reads the instructional prompt override, falling back to the built-in one.
async fn load_prompt(config: &Config) -> Result<PromptTemplate, ApiError> {
    let path = config.system_prompt_file();
    match tokio::fs::read_to_string(&path).await {
        Ok(template) if !template.trim().is_empty() => {
            info!("Loaded system prompt from {}", path.display());
            Ok(PromptTemplate::new(template))
        }
        Ok(_) => {
            warn!("{} is empty; using the built-in system prompt.", path.display());
            Ok(PromptTemplate::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No system prompt override found; using the built-in one.");
            Ok(PromptTemplate::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn cors_layer(config: &Config) -> Result<CorsLayer, ApiError> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);
    Ok(match &config.cors_origin {
        Some(origin) => cors.allow_origin(origin.parse::<HeaderValue>().map_err(|e| {
            ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", origin, e))
        })?),
        None => cors.allow_origin(Any),
    })
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let tutor_adapter = Arc::new(OpenAiTutorAdapter::new(
        openai_client.clone(),
        config.tutor_model.clone(),
        config.tutor_temperature,
    ));
    let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
        openai_client,
        SpeechModel::Tts1,
        parse_voice(&config.tts_voice)?,
    ));

    // --- 4. Start Reconciliation & Build the Shared AppState ---
    let (reconciler, _reconciler_task) = Reconciler::spawn(db_adapter.clone());
    let tutor = Tutor::new(db_adapter, tutor_adapter, load_prompt(&config).await?, reconciler);
    let speech = SpeechCache::new(config.audio_cache_dir.clone(), tts_adapter).await?;

    let app_state = Arc::new(AppState {
        tutor: Arc::new(tutor),
        speech: Arc::new(speech),
    });

    // --- 5. Create the Web Router ---
    let api_router = router(app_state).layer(cors_layer(&config)?);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
