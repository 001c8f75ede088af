//! crates/storybook_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::domain::{
    GeneratedAudio, GeneratedImage, GeneratedStory, ImageOptions, NewStory, SpeechOptions,
    StoredAsset, Story, StoryFilter, StoryOptions, StoryStatus, UploadOptions, User,
    UserCredentials, UserPreferences, VoiceOption,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Access denied")]
    AccessDenied,
    #[error("Malformed model output: {0}")]
    Parse(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Uniform persistence contract over the durable store and the in-memory
/// fallback. Both implementations must produce records of identical shape.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, name: &str, email: &str, password_hash: &str)
        -> PortResult<User>;

    async fn get_user(&self, user_id: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn update_user_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        preferences: Option<UserPreferences>,
    ) -> PortResult<User>;

    async fn update_user_password(&self, user_id: &str, password_hash: &str) -> PortResult<()>;

    async fn delete_user(&self, user_id: &str) -> PortResult<bool>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<String>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Story Management ---
    async fn create_story(&self, story: NewStory) -> PortResult<Story>;

    async fn get_story(&self, story_id: &str) -> PortResult<Story>;

    async fn get_story_by_share_id(&self, share_id: &str) -> PortResult<Story>;

    /// Full-record write. The orchestrator is the only writer while a story
    /// is `generating`; last write wins otherwise.
    async fn save_story(&self, story: &Story) -> PortResult<Story>;

    /// Narrow status write, used by the orchestrator's failure path.
    async fn update_story_status(&self, story_id: &str, status: StoryStatus) -> PortResult<()>;

    /// Offset-paginated listing, newest first. Returns the page of records
    /// and the total match count.
    async fn list_stories(
        &self,
        filter: StoryFilter,
        page: u32,
        limit: u32,
    ) -> PortResult<(Vec<Story>, u64)>;

    async fn delete_story(&self, story_id: &str) -> PortResult<bool>;
}

/// Story text generation. Falls back to a deterministic mock story when no
/// remote model is configured; only unrecoverable parse failures surface.
#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn generate_story(
        &self,
        prompt: &str,
        options: &StoryOptions,
    ) -> PortResult<GeneratedStory>;
}

/// Image generation. A failed or unconfigured backend yields a clearly
/// marked placeholder result rather than an error.
#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    async fn generate_image(&self, prompt: &str, options: &ImageOptions)
        -> PortResult<GeneratedImage>;

    /// Sequential batch helper with an inter-call delay to respect upstream
    /// rate limits. Not used by the generation pipeline.
    async fn generate_batch(
        &self,
        prompts: &[String],
        options: &ImageOptions,
    ) -> Vec<GeneratedImage>;
}

/// Speech synthesis. Unconfigured or failing backends yield a fallback
/// descriptor carrying the same duration estimate a real run would.
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn generate_audio(&self, text: &str, options: &SpeechOptions)
        -> PortResult<GeneratedAudio>;

    /// Sequential batch helper with an inter-call delay. Per-item failures
    /// are absorbed into fallback descriptors.
    async fn generate_batch(
        &self,
        texts: &[String],
        options: &SpeechOptions,
    ) -> Vec<GeneratedAudio>;

    fn voice_options(&self) -> Vec<VoiceOption>;

    /// Best-effort removal of synthesized temp files.
    async fn cleanup_temp_files(&self, paths: &[PathBuf]);
}

/// Object storage for generated assets. Backends are tried in a fixed
/// preference order; the first available one wins.
#[async_trait]
pub trait AssetStorageService: Send + Sync {
    async fn upload_image(&self, data: &[u8], options: &UploadOptions) -> PortResult<StoredAsset>;

    async fn upload_audio(&self, data: &[u8], options: &UploadOptions) -> PortResult<StoredAsset>;

    /// Ingest a remote URL, either directly (when the backend supports it)
    /// or by downloading and re-uploading.
    async fn upload_from_url(&self, url: &str, options: &UploadOptions) -> PortResult<StoredAsset>;

    /// Upload a file from disk, dispatching on its extension.
    async fn upload_file(&self, path: &Path, options: &UploadOptions) -> PortResult<StoredAsset>;

    /// Best-effort deletion. An already-deleted asset is not an error.
    async fn delete_file(&self, public_id: &str, service: &str);
}
