//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db::DbAdapter, image::ImageAdapter, memory::MemoryStore, storage::StorageAdapter,
        story_llm::OpenAiStoryAdapter, tts::OpenAiSpeechAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        ai::{
            generate_audio_handler, generate_image_handler, generate_story_handler,
            generate_text_handler, get_shared_story_handler, get_story_handler,
            story_status_handler, voice_options_handler,
        },
        auth::{
            change_password_handler, delete_account_handler, login_handler, logout_handler,
            me_handler, register_handler, update_profile_handler,
        },
        middleware::{optional_auth, require_auth},
        rest::{health_handler, ApiDoc},
        state::AppState,
        stories::{
            delete_story_handler, list_public_stories_handler, list_stories_handler,
            update_story_handler,
        },
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use storybook_core::ports::DatabaseService;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Probes the durable store once at startup. When the connection string is
/// missing or the probe fails, the service runs on the in-memory store and
/// says so loudly.
async fn select_database(config: &Config) -> Result<Arc<dyn DatabaseService>, ApiError> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set; using in-memory storage (data is lost on restart)");
        return Ok(Arc::new(MemoryStore::new()));
    };

    info!("Connecting to database...");
    match PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
    {
        Ok(pool) => {
            let db_adapter = Arc::new(DbAdapter::new(pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Ok(db_adapter)
        }
        Err(e) => {
            warn!(
                "Database connection failed ({}); using in-memory storage (data is lost on restart)",
                e
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
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

    // --- 2. Select the Storage Backend ---
    let db = select_database(&config).await?;

    // --- 3. Initialize Service Adapters ---
    let openai_client = config.openai_api_key.as_ref().map(|key| {
        Client::with_config(OpenAIConfig::new().with_api_key(key))
    });

    let text_adapter = Arc::new(OpenAiStoryAdapter::new(
        openai_client.clone(),
        config.text_model.clone(),
    ));
    let image_adapter = Arc::new(ImageAdapter::new(
        config.openai_api_key.clone(),
        config.stability_api_key.clone(),
    ));
    let speech_adapter = Arc::new(OpenAiSpeechAdapter::new(
        openai_client,
        &config.tts_voice,
    ));
    let storage_adapter = Arc::new(StorageAdapter::new(
        config.cloudinary.clone(),
        config.gcs.clone(),
        config.upload_dir.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        text_adapter,
        image_adapter,
        speech_adapter,
        storage_adapter,
    });

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/stories/public", get(list_public_stories_handler))
        .route("/api/ai/story/{id}/status", get(story_status_handler))
        .route("/api/ai/shared/{share_id}", get(get_shared_story_handler))
        .route("/api/ai/generate-text", post(generate_text_handler))
        .route("/api/ai/generate-image", post(generate_image_handler))
        .route("/api/ai/generate-audio", post(generate_audio_handler))
        .route("/api/ai/voice-options", get(voice_options_handler));

    // Routes that serve anonymous callers but attach the user when present
    let optional_routes = Router::new()
        .route("/api/ai/generate-story", post(generate_story_handler))
        .route("/api/ai/story/{id}", get(get_story_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            optional_auth,
        ));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/auth/me", get(me_handler))
        .route("/api/auth/profile", put(update_profile_handler))
        .route("/api/auth/change-password", put(change_password_handler))
        .route("/api/auth/account", delete(delete_account_handler))
        .route("/api/stories", get(list_stories_handler))
        .route(
            "/api/stories/{id}",
            put(update_story_handler).delete(delete_story_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Locally stored assets are served straight from the uploads directory.
    let app = Router::new()
        .merge(api_router)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
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
