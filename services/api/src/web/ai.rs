//! services/api/src/web/ai.rs
//!
//! Generation endpoints: the pipeline trigger and its status/fetch routes,
//! plus direct single-shot routes that exercise the generation clients and
//! asset storage without a story record.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use storybook_core::domain::{
    ImageOptions, NewStory, SpeechOptions, StoryOptions, UploadOptions,
};
use storybook_core::ports::PortError;
use tracing::error;
use utoipa::ToSchema;

use crate::web::generation_task::{run_generation, GenerationContext};
use crate::web::middleware::MaybeUser;
use crate::web::state::AppState;
use crate::web::stories::story_json;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateStoryRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: StoryOptions,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateTextRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: StoryOptions,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateImageRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: ImageOptions,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateAudioRequest {
    pub text: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: SpeechOptions,
}

fn internal(message: &str) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

//=========================================================================================
// Pipeline routes
//=========================================================================================

/// POST /api/ai/generate-story - Start a full story generation run
#[utoipa::path(
    post,
    path = "/api/ai/generate-story",
    request_body = GenerateStoryRequest,
    responses(
        (status = 200, description = "Generation started; poll the status route"),
        (status = 400, description = "Missing prompt")
    )
)]
pub async fn generate_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(MaybeUser(user_id)): Extension<MaybeUser>,
    Json(req): Json<GenerateStoryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Story prompt is required".to_string(),
        ))?;

    let story = state
        .db
        .create_story(NewStory {
            title: "Generating...".to_string(),
            prompt: prompt.clone(),
            user_id,
        })
        .await
        .map_err(|e| {
            error!("Error starting story generation: {:?}", e);
            internal("Failed to start story generation")
        })?;

    // The pipeline runs detached; its failure path writes to the record.
    let ctx = GenerationContext::from_state(&state);
    tokio::spawn(run_generation(ctx, story.id.clone(), prompt, req.options));

    Ok(Json(json!({
        "success": true,
        "storyId": story.id,
        "message": "Story generation started. Check status for progress.",
    })))
}

/// GET /api/ai/story/{id}/status - Poll a generation run
#[utoipa::path(
    get,
    path = "/api/ai/story/{id}/status",
    responses(
        (status = 200, description = "Current status and per-phase progress"),
        (status = 404, description = "Story not found")
    ),
    params(("id" = String, Path, description = "The story id"))
)]
pub async fn story_status_handler(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let story = match state.db.get_story(&story_id).await {
        Ok(story) => story,
        Err(PortError::NotFound(_)) => {
            return Err((StatusCode::NOT_FOUND, "Story not found".to_string()))
        }
        Err(e) => {
            error!("Error getting story status: {:?}", e);
            return Err(internal("Failed to get story status"));
        }
    };

    Ok(Json(json!({
        "id": story.id,
        "status": story.status,
        "progress": story.progress,
        "title": story.title,
        "pagesGenerated": story.pages.len(),
    })))
}

/// GET /api/ai/story/{id} - Fetch a complete story
#[utoipa::path(
    get,
    path = "/api/ai/story/{id}",
    responses(
        (status = 200, description = "The story record"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Story not found")
    ),
    params(("id" = String, Path, description = "The story id"))
)]
pub async fn get_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(MaybeUser(user_id)): Extension<MaybeUser>,
    Path(story_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let story = match state.db.get_story(&story_id).await {
        Ok(story) => story,
        Err(PortError::NotFound(_)) => {
            return Err((StatusCode::NOT_FOUND, "Story not found".to_string()))
        }
        Err(e) => {
            error!("Error getting story: {:?}", e);
            return Err(internal("Failed to get story"));
        }
    };

    // Owned stories are visible to their owner and to nobody else unless
    // public. Anonymous stories stay readable by whoever holds the id.
    if !story.is_public {
        if let Some(owner) = &story.user_id {
            if user_id.as_deref() != Some(owner.as_str()) {
                return Err((StatusCode::FORBIDDEN, "Access denied".to_string()));
            }
        }
    }

    Ok(Json(story_json(&story)))
}

/// GET /api/ai/shared/{share_id} - Fetch a story by its share link
#[utoipa::path(
    get,
    path = "/api/ai/shared/{share_id}",
    responses(
        (status = 200, description = "The shared story"),
        (status = 404, description = "Story not found or not public")
    ),
    params(("share_id" = String, Path, description = "The share id"))
)]
pub async fn get_shared_story_handler(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            "Story not found or not public".to_string(),
        )
    };

    let story = match state.db.get_story_by_share_id(&share_id).await {
        Ok(story) => story,
        Err(PortError::NotFound(_)) => return Err(not_found()),
        Err(e) => {
            error!("Error getting shared story: {:?}", e);
            return Err(internal("Failed to get shared story"));
        }
    };

    if !story.is_public {
        return Err(not_found());
    }

    Ok(Json(story_json(&story)))
}

//=========================================================================================
// Direct generation routes
//=========================================================================================

/// POST /api/ai/generate-text - Generate story text only
#[utoipa::path(
    post,
    path = "/api/ai/generate-text",
    request_body = GenerateTextRequest,
    responses(
        (status = 200, description = "The generated story text"),
        (status = 400, description = "Missing prompt")
    )
)]
pub async fn generate_text_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateTextRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Prompt is required".to_string()))?;

    let story = state
        .text_adapter
        .generate_story(&prompt, &req.options)
        .await
        .map_err(|e| {
            error!("Error generating story text: {:?}", e);
            internal("Failed to generate story text")
        })?;

    Ok(Json(story))
}

/// POST /api/ai/generate-image - Generate a single illustration
#[utoipa::path(
    post,
    path = "/api/ai/generate-image",
    request_body = GenerateImageRequest,
    responses(
        (status = 200, description = "The generated image, stored when real"),
        (status = 400, description = "Missing prompt")
    )
)]
pub async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateImageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Image prompt is required".to_string(),
        ))?;

    let image = state
        .image_adapter
        .generate_image(&prompt, &req.options)
        .await
        .map_err(|e| {
            error!("Error generating image: {:?}", e);
            internal("Failed to generate image")
        })?;

    let mut body = serde_json::to_value(&image).unwrap_or_else(|_| json!({}));

    // Upstream image URLs expire; persist real results into our storage.
    if !image.is_placeholder {
        match state
            .storage_adapter
            .upload_from_url(&image.url, &UploadOptions::image("storybook/temp-images"))
            .await
        {
            Ok(stored) => {
                body["storedUrl"] = json!(stored.url);
            }
            Err(e) => error!("Failed to store generated image: {:?}", e),
        }
    }

    Ok(Json(body))
}

/// POST /api/ai/generate-audio - Synthesize narration for a text
#[utoipa::path(
    post,
    path = "/api/ai/generate-audio",
    request_body = GenerateAudioRequest,
    responses(
        (status = 200, description = "The synthesized audio descriptor"),
        (status = 400, description = "Missing text")
    )
)]
pub async fn generate_audio_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateAudioRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let text = req
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "Text is required".to_string()))?;

    let audio = state
        .speech_adapter
        .generate_audio(&text, &req.options)
        .await
        .map_err(|e| {
            error!("Error generating audio: {:?}", e);
            internal("Failed to generate audio")
        })?;

    let mut body = serde_json::to_value(&audio).unwrap_or_else(|_| json!({}));

    if let Some(path) = &audio.file_path {
        match state
            .storage_adapter
            .upload_file(path, &UploadOptions::audio("storybook/temp-audio"))
            .await
        {
            Ok(stored) => {
                body["url"] = json!(stored.url);
                state.speech_adapter.cleanup_temp_files(&[path.clone()]).await;
            }
            Err(e) => error!("Failed to store generated audio: {:?}", e),
        }
    }

    Ok(Json(body))
}

/// GET /api/ai/voice-options - List the available narration voices
#[utoipa::path(
    get,
    path = "/api/ai/voice-options",
    responses((status = 200, description = "The voice catalogue"))
)]
pub async fn voice_options_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.speech_adapter.voice_options())
}
