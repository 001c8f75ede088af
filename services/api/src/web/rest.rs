//! services/api/src/web/rest.rs
//!
//! The health endpoint and the master definition for the OpenAPI
//! specification. The remaining handlers live in `auth.rs`, `stories.rs`
//! and `ai.rs`.

use axum::Json;
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::web::{ai, auth, stories};

//=========================================================================================
// Health Check
//=========================================================================================

/// GET /api/health - Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "The service is running"))
)]
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Storybook API is running",
    }))
}

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::update_profile_handler,
        auth::change_password_handler,
        auth::delete_account_handler,
        stories::list_stories_handler,
        stories::list_public_stories_handler,
        stories::update_story_handler,
        stories::delete_story_handler,
        ai::generate_story_handler,
        ai::story_status_handler,
        ai::get_story_handler,
        ai::get_shared_story_handler,
        ai::generate_text_handler,
        ai::generate_image_handler,
        ai::generate_audio_handler,
        ai::voice_options_handler,
    ),
    components(
        schemas(
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::UpdateProfileRequest,
            auth::ChangePasswordRequest,
            stories::UpdateStoryRequest,
            ai::GenerateStoryRequest,
            ai::GenerateTextRequest,
            ai::GenerateImageRequest,
            ai::GenerateAudioRequest,
        )
    ),
    tags(
        (name = "Storybook API", description = "API endpoints for illustrated story generation.")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_ok() {
        let Json(body) = health_handler().await;
        assert_eq!(body["status"], json!("OK"));
    }
}
