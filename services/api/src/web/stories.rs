//! services/api/src/web/stories.rs
//!
//! Story library endpoints: the owner's list, the public gallery, title and
//! visibility updates, and deletion. JSON views of a story expose both `id`
//! and `_id`; existing clients read either key.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use storybook_core::domain::{Story, StoryFilter, StoryStatus};
use storybook_core::ports::PortError;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;

const DEFAULT_LIST_LIMIT: u32 = 10;
const DEFAULT_PUBLIC_LIMIT: u32 = 12;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStoryRequest {
    pub title: Option<String>,
    pub is_public: Option<bool>,
}

//=========================================================================================
// JSON shaping helpers
//=========================================================================================

/// Serializes a story with the `_id` alias alongside `id`.
pub fn story_json(story: &Story) -> Value {
    let mut value = serde_json::to_value(story).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("_id".to_string(), json!(story.id));
    }
    value
}

/// List views omit the detailed image prompts.
fn strip_image_prompts(story_value: &mut Value) {
    if let Some(pages) = story_value.get_mut("pages").and_then(Value::as_array_mut) {
        for page in pages {
            if let Value::Object(map) = page {
                map.remove("imagePrompt");
            }
        }
    }
}

/// Public gallery entries carry only the first page as a preview.
fn truncate_to_preview(story_value: &mut Value) {
    if let Some(pages) = story_value.get_mut("pages").and_then(Value::as_array_mut) {
        pages.truncate(1);
    }
}

fn pagination_json(page: u32, limit: u32, total: u64) -> Value {
    let pages = if limit == 0 {
        0
    } else {
        total.div_ceil(limit as u64)
    };
    json!({
        "page": page,
        "limit": limit,
        "total": total,
        "pages": pages,
    })
}

/// Assigns a share id the first time the story goes public. Once set it is
/// never regenerated, so share links survive visibility toggles.
pub fn ensure_share_id(story: &mut Story) {
    if story.share_id.is_none() {
        story.share_id = Some(Uuid::new_v4().to_string());
    }
}

fn internal(message: &str) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/stories - List the authenticated user's stories
#[utoipa::path(
    get,
    path = "/api/stories",
    responses(
        (status = 200, description = "Paginated list of the user's stories"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_stories_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);

    let filter = StoryFilter {
        user_id: Some(user_id),
        ..Default::default()
    };
    let (stories, total) = state
        .db
        .list_stories(filter, page, limit)
        .await
        .map_err(|e| {
            error!("Error getting user stories: {:?}", e);
            internal("Failed to get stories")
        })?;

    let stories: Vec<Value> = stories
        .iter()
        .map(|story| {
            let mut value = story_json(story);
            strip_image_prompts(&mut value);
            value
        })
        .collect();

    Ok(Json(json!({
        "stories": stories,
        "pagination": pagination_json(page, limit, total),
    })))
}

/// GET /api/stories/public - Browse the public gallery
#[utoipa::path(
    get,
    path = "/api/stories/public",
    responses(
        (status = 200, description = "Paginated list of public, completed stories")
    )
)]
pub async fn list_public_stories_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PUBLIC_LIMIT).max(1);

    let filter = StoryFilter {
        is_public: Some(true),
        status: Some(StoryStatus::Completed),
        ..Default::default()
    };
    let (stories, total) = state
        .db
        .list_stories(filter, page, limit)
        .await
        .map_err(|e| {
            error!("Error getting public stories: {:?}", e);
            internal("Failed to get public stories")
        })?;

    let stories: Vec<Value> = stories
        .iter()
        .map(|story| {
            let mut value = story_json(story);
            strip_image_prompts(&mut value);
            truncate_to_preview(&mut value);
            value
        })
        .collect();

    Ok(Json(json!({
        "stories": stories,
        "pagination": pagination_json(page, limit, total),
    })))
}

/// PUT /api/stories/{id} - Update a story's title and/or visibility
#[utoipa::path(
    put,
    path = "/api/stories/{id}",
    request_body = UpdateStoryRequest,
    responses(
        (status = 200, description = "The updated story"),
        (status = 404, description = "Story not found"),
        (status = 401, description = "Not authenticated")
    ),
    params(("id" = String, Path, description = "The story id"))
)]
pub async fn update_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(story_id): Path<String>,
    Json(req): Json<UpdateStoryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut story = match state.db.get_story(&story_id).await {
        Ok(story) => story,
        Err(PortError::NotFound(_)) => {
            return Err((StatusCode::NOT_FOUND, "Story not found".to_string()))
        }
        Err(e) => {
            error!("Error updating story: {:?}", e);
            return Err(internal("Failed to update story"));
        }
    };

    // Ownership is part of the lookup: a non-owner sees the same 404 as a
    // missing record, never a hint that the story exists.
    if story.user_id.as_deref() != Some(user_id.as_str()) {
        return Err((StatusCode::NOT_FOUND, "Story not found".to_string()));
    }

    if let Some(is_public) = req.is_public {
        story.is_public = is_public;
        if is_public {
            ensure_share_id(&mut story);
        }
    }
    if let Some(title) = req.title {
        if !title.trim().is_empty() {
            story.title = title;
        }
    }

    let saved = state.db.save_story(&story).await.map_err(|e| {
        error!("Error updating story: {:?}", e);
        internal("Failed to update story")
    })?;

    Ok(Json(story_json(&saved)))
}

/// DELETE /api/stories/{id} - Delete one of the user's stories
#[utoipa::path(
    delete,
    path = "/api/stories/{id}",
    responses(
        (status = 200, description = "Story deleted"),
        (status = 404, description = "Story not found"),
        (status = 401, description = "Not authenticated")
    ),
    params(("id" = String, Path, description = "The story id"))
)]
pub async fn delete_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(story_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let story = match state.db.get_story(&story_id).await {
        Ok(story) => story,
        Err(PortError::NotFound(_)) => {
            return Err((StatusCode::NOT_FOUND, "Story not found".to_string()))
        }
        Err(e) => {
            error!("Error deleting story: {:?}", e);
            return Err(internal("Failed to delete story"));
        }
    };

    if story.user_id.as_deref() != Some(user_id.as_str()) {
        return Err((StatusCode::NOT_FOUND, "Story not found".to_string()));
    }

    // TODO: clean up the story's stored assets as well.
    state.db.delete_story(&story_id).await.map_err(|e| {
        error!("Error deleting story: {:?}", e);
        internal("Failed to delete story")
    })?;

    Ok(Json(json!({ "message": "Story deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storybook_core::domain::{GenerationProgress, StoryMetadata, StoryPage};

    fn sample_story() -> Story {
        Story {
            id: "42".to_string(),
            share_id: None,
            title: "A Test Story".to_string(),
            prompt: "a test".to_string(),
            user_id: Some("7".to_string()),
            pages: vec![StoryPage {
                page_number: 1,
                title: "Page 1".to_string(),
                text: "Once upon a time.".to_string(),
                image_prompt: "a detailed scene".to_string(),
                image_url: None,
                audio_url: None,
            }],
            metadata: StoryMetadata::default(),
            status: StoryStatus::Completed,
            is_public: false,
            progress: GenerationProgress::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_share_id_assigned_exactly_once() {
        let mut story = sample_story();
        assert!(story.share_id.is_none());

        ensure_share_id(&mut story);
        let first = story.share_id.clone().unwrap();

        // Toggling visibility again must not rotate the share link.
        ensure_share_id(&mut story);
        assert_eq!(story.share_id.as_deref(), Some(first.as_str()));
    }

    #[test]
    fn test_story_json_aliases_id() {
        let story = sample_story();
        let value = story_json(&story);
        assert_eq!(value["id"], json!("42"));
        assert_eq!(value["_id"], json!("42"));
        assert_eq!(value["pages"][0]["imagePrompt"], json!("a detailed scene"));
    }

    #[test]
    fn test_strip_image_prompts_removes_only_prompts() {
        let story = sample_story();
        let mut value = story_json(&story);
        strip_image_prompts(&mut value);
        assert!(value["pages"][0].get("imagePrompt").is_none());
        assert_eq!(value["pages"][0]["text"], json!("Once upon a time."));
    }

    #[test]
    fn test_preview_truncates_to_first_page() {
        let mut story = sample_story();
        let mut second = story.pages[0].clone();
        second.page_number = 2;
        story.pages.push(second);

        let mut value = story_json(&story);
        truncate_to_preview(&mut value);
        assert_eq!(value["pages"].as_array().unwrap().len(), 1);
        assert_eq!(value["pages"][0]["pageNumber"], json!(1));
    }

    #[test]
    fn test_pagination_rounds_up_page_count() {
        let value = pagination_json(1, 10, 25);
        assert_eq!(value["pages"], json!(3));
        assert_eq!(value["total"], json!(25));
    }
}
