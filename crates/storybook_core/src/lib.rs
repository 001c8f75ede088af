pub mod domain;
pub mod ports;

pub use domain::{
    AssetKind, AuthSession, GeneratedAudio, GeneratedImage, GeneratedMetadata, GeneratedPage,
    GeneratedStory, GenerationProgress, ImageOptions, NewStory, SpeechOptions, StoredAsset, Story,
    StoryFilter, StoryMetadata, StoryOptions, StoryPage, StoryStatus, Subscription, UploadOptions,
    User, UserCredentials, UserPreferences, VoiceOption,
};
pub use ports::{
    AssetStorageService, DatabaseService, ImageGenerationService, PortError, PortResult,
    SpeechService, TextGenerationService,
};
