//! crates/storybook_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or web framework. They
//! serialize with camelCase field names so the REST layer, the JSONB
//! columns and the in-memory store all share one JSON shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

//=========================================================================================
// Stories
//=========================================================================================

/// Lifecycle of a story record. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Generating,
    Completed,
    Failed,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Generating => "generating",
            StoryStatus::Completed => "completed",
            StoryStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "generating" => Some(StoryStatus::Generating),
            "completed" => Some(StoryStatus::Completed),
            "failed" => Some(StoryStatus::Failed),
            _ => None,
        }
    }
}

/// Per-phase completion flags for one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub story_generated: bool,
    pub images_generated: bool,
    pub audio_generated: bool,
    pub completed: bool,
}

/// One page of a generated story. The page sequence is fixed once the text
/// phase completes; later phases only fill in the asset URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    pub page_number: u32,
    pub title: String,
    pub text: String,
    pub image_prompt: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// Free-form descriptive metadata attached to a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub art_style: Option<String>,
}

/// A story record, the unit of work and the unit of storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    /// Opaque public token. Assigned at most once, when the owner first
    /// marks the story public.
    #[serde(default)]
    pub share_id: Option<String>,
    pub title: String,
    pub prompt: String,
    /// Owner reference. `None` for anonymously generated stories.
    #[serde(default)]
    pub user_id: Option<String>,
    pub pages: Vec<StoryPage>,
    #[serde(default)]
    pub metadata: StoryMetadata,
    pub status: StoryStatus,
    pub is_public: bool,
    #[serde(default)]
    pub progress: GenerationProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields a caller supplies when creating a story record; the storage
/// backend assigns the id, timestamps and initial state.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub title: String,
    pub prompt: String,
    pub user_id: Option<String>,
}

/// Caller-facing knobs for one generation run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryOptions {
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub art_style: Option<String>,
}

/// Filter for story list queries. All criteria are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub user_id: Option<String>,
    pub is_public: Option<bool>,
    pub status: Option<StoryStatus>,
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub favorite_genres: Vec<String>,
    pub preferred_art_style: String,
    pub default_age_group: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            favorite_genres: Vec::new(),
            preferred_art_style: "colorful illustration".to_string(),
            default_age_group: "children".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub tier: String,
    pub stories_this_month: u32,
    pub last_reset_date: DateTime<Utc>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            tier: "free".to_string(),
            stories_this_month: 0,
            last_reset_date: Utc::now(),
        }
    }
}

/// Represents a user - used throughout the app. Never carries the password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub preferences: UserPreferences,
    pub subscription: Subscription,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: String,
    pub email: String,
    pub password_hash: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Generation results
//=========================================================================================

/// Structured story text as returned by the text generation client,
/// before it is folded into a `Story` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStory {
    pub title: String,
    pub pages: Vec<GeneratedPage>,
    #[serde(default)]
    pub metadata: GeneratedMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPage {
    pub page_number: u32,
    #[serde(default)]
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub image_prompt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMetadata {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageOptions {
    pub style: Option<String>,
    pub size: Option<String>,
}

/// Outcome of one image generation call. `is_placeholder` is always
/// accurate: the caller is never left uncertain whether the URL is real.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub url: String,
    pub service: String,
    pub prompt: String,
    pub is_placeholder: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechOptions {
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

/// Outcome of one speech synthesis call. The duration is always a
/// word-count estimate and never depends on actual synthesis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAudio {
    pub file_path: Option<PathBuf>,
    pub file_name: Option<String>,
    pub service: String,
    pub duration_secs: u32,
    pub placeholder: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceOption {
    pub name: String,
    pub language: String,
    pub gender: String,
    pub description: String,
}

//=========================================================================================
// Asset storage
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Audio,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub folder: String,
    pub public_id: Option<String>,
    pub format: Option<String>,
    pub kind: AssetKind,
}

impl UploadOptions {
    pub fn image(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            public_id: None,
            format: None,
            kind: AssetKind::Image,
        }
    }

    pub fn audio(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            public_id: None,
            format: None,
            kind: AssetKind::Audio,
        }
    }
}

/// A stored asset: its public URL and which backend accepted it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub url: String,
    pub public_id: Option<String>,
    pub service: String,
}
