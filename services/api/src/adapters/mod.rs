pub mod db;
pub mod image;
pub mod memory;
pub mod storage;
pub mod story_llm;
pub mod tts;

pub use db::DbAdapter;
pub use image::ImageAdapter;
pub use memory::MemoryStore;
pub use storage::StorageAdapter;
pub use story_llm::OpenAiStoryAdapter;
pub use tts::OpenAiSpeechAdapter;
