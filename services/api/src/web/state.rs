//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use storybook_core::ports::{
    AssetStorageService, DatabaseService, ImageGenerationService, SpeechService,
    TextGenerationService,
};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
/// `db` is either the Postgres adapter or the in-memory store; the choice is
/// made once at startup and handlers never know the difference.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub text_adapter: Arc<dyn TextGenerationService>,
    pub image_adapter: Arc<dyn ImageGenerationService>,
    pub speech_adapter: Arc<dyn SpeechService>,
    pub storage_adapter: Arc<dyn AssetStorageService>,
}
