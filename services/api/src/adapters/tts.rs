//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `SpeechService` port from the `core` crate. Synthesized
//! audio is written to a temp file on disk; callers upload it to asset
//! storage and then ask for cleanup. When no client is configured, or a call
//! fails, the adapter returns a fallback descriptor instead of an error so
//! the narration phase never sinks a generation run.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use storybook_core::domain::{GeneratedAudio, SpeechOptions, VoiceOption};
use storybook_core::ports::{PortResult, SpeechService};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_SPEED: f32 = 0.9;
const WORDS_PER_MINUTE: u32 = 150;

/// Delay between sequential batch calls, to stay under upstream rate limits.
const BATCH_DELAY: Duration = Duration::from_secs(1);

/// Estimates narration length from word count at a typical read-aloud pace.
pub fn estimate_duration_secs(text: &str) -> u32 {
    let words = text.split_whitespace().count() as u32;
    (words * 60).div_ceil(WORDS_PER_MINUTE)
}

fn parse_voice(name: &str) -> Option<Voice> {
    match name {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechService` port using the OpenAI TTS API.
pub struct OpenAiSpeechAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: SpeechModel,
    default_voice: Voice,
    temp_dir: PathBuf,
}

impl OpenAiSpeechAdapter {
    /// Creates a new `OpenAiSpeechAdapter`. A `None` client selects the
    /// fallback descriptor path unconditionally.
    pub fn new(client: Option<Client<OpenAIConfig>>, default_voice: &str) -> Self {
        if client.is_none() {
            warn!("No TTS API key configured; audio generation will return fallback descriptors");
        }
        Self {
            client,
            model: SpeechModel::Tts1Hd,
            default_voice: parse_voice(default_voice).unwrap_or(Voice::Nova),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// The descriptor returned when synthesis is skipped or fails. It
    /// carries the same duration estimate a real run would.
    fn fallback_audio(text: &str) -> GeneratedAudio {
        GeneratedAudio {
            file_path: None,
            file_name: None,
            service: "fallback".to_string(),
            duration_secs: estimate_duration_secs(text),
            placeholder: true,
        }
    }

    async fn synthesize(
        &self,
        client: &Client<OpenAIConfig>,
        text: &str,
        options: &SpeechOptions,
    ) -> Result<GeneratedAudio, OpenAIError> {
        let voice = options
            .voice
            .as_deref()
            .and_then(parse_voice)
            .unwrap_or_else(|| self.default_voice.clone());

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice,
            speed: Some(options.speed.unwrap_or(DEFAULT_SPEED)),
            ..Default::default()
        };

        let response = client.audio().speech().create(request).await?;

        let file_name = format!("audio_{}.mp3", Uuid::new_v4());
        let file_path = self.temp_dir.join(&file_name);
        tokio::fs::write(&file_path, response.bytes.as_ref())
            .await
            .map_err(|e| OpenAIError::FileSaveError(e.to_string()))?;

        Ok(GeneratedAudio {
            file_path: Some(file_path),
            file_name: Some(file_name),
            service: "openai".to_string(),
            duration_secs: estimate_duration_secs(text),
            placeholder: false,
        })
    }
}

//=========================================================================================
// `SpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechService for OpenAiSpeechAdapter {
    async fn generate_audio(
        &self,
        text: &str,
        options: &SpeechOptions,
    ) -> PortResult<GeneratedAudio> {
        let Some(client) = &self.client else {
            return Ok(Self::fallback_audio(text));
        };

        match self.synthesize(client, text, options).await {
            Ok(audio) => Ok(audio),
            Err(error) => {
                warn!("TTS synthesis failed, returning fallback descriptor: {}", error);
                Ok(Self::fallback_audio(text))
            }
        }
    }

    async fn generate_batch(
        &self,
        texts: &[String],
        options: &SpeechOptions,
    ) -> Vec<GeneratedAudio> {
        let mut results = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(BATCH_DELAY).await;
            }
            match self.generate_audio(text, options).await {
                Ok(audio) => results.push(audio),
                Err(error) => {
                    warn!("Batch audio {} failed: {}", index + 1, error);
                    results.push(Self::fallback_audio(text));
                }
            }
        }
        results
    }

    fn voice_options(&self) -> Vec<VoiceOption> {
        vec![
            VoiceOption {
                name: "alloy".to_string(),
                language: "en".to_string(),
                gender: "neutral".to_string(),
                description: "Balanced and clear".to_string(),
            },
            VoiceOption {
                name: "echo".to_string(),
                language: "en".to_string(),
                gender: "male".to_string(),
                description: "Warm and resonant".to_string(),
            },
            VoiceOption {
                name: "fable".to_string(),
                language: "en".to_string(),
                gender: "neutral".to_string(),
                description: "Expressive storyteller".to_string(),
            },
            VoiceOption {
                name: "onyx".to_string(),
                language: "en".to_string(),
                gender: "male".to_string(),
                description: "Deep and steady".to_string(),
            },
            VoiceOption {
                name: "nova".to_string(),
                language: "en".to_string(),
                gender: "female".to_string(),
                description: "Bright and friendly, suited to children's stories".to_string(),
            },
            VoiceOption {
                name: "shimmer".to_string(),
                language: "en".to_string(),
                gender: "female".to_string(),
                description: "Soft and gentle".to_string(),
            },
        ]
    }

    async fn cleanup_temp_files(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed temp audio file {}", path.display()),
                Err(error) => debug!(
                    "Could not remove temp audio file {}: {}",
                    path.display(),
                    error
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_estimate_rounds_up() {
        // 150 words per minute -> 2.5 words per second.
        assert_eq!(estimate_duration_secs("one two three four five"), 2);
        assert_eq!(estimate_duration_secs("word"), 1);
        assert_eq!(estimate_duration_secs(""), 0);
        let long_text = vec!["word"; 300].join(" ");
        assert_eq!(estimate_duration_secs(&long_text), 120);
    }

    #[tokio::test]
    async fn test_unconfigured_adapter_returns_fallback_with_estimate() {
        let adapter = OpenAiSpeechAdapter::new(None, "nova");
        let audio = adapter
            .generate_audio("one two three four five", &SpeechOptions::default())
            .await
            .unwrap();
        assert!(audio.placeholder);
        assert_eq!(audio.service, "fallback");
        assert_eq!(audio.duration_secs, 2);
        assert!(audio.file_path.is_none());
    }

    #[test]
    fn test_voice_names_parse_and_unknown_falls_back() {
        assert!(parse_voice("nova").is_some());
        assert!(parse_voice("shimmer").is_some());
        assert!(parse_voice("robot").is_none());
        // An unknown default voice degrades to Nova instead of failing.
        let adapter = OpenAiSpeechAdapter::new(None, "robot");
        assert!(matches!(adapter.default_voice, Voice::Nova));
    }

    #[test]
    fn test_voice_catalogue_includes_default() {
        let adapter = OpenAiSpeechAdapter::new(None, "nova");
        let voices = adapter.voice_options();
        assert!(voices.iter().any(|voice| voice.name == "nova"));
        assert_eq!(voices.len(), 6);
    }

    #[tokio::test]
    async fn test_cleanup_ignores_missing_files() {
        let adapter = OpenAiSpeechAdapter::new(None, "nova");
        adapter
            .cleanup_temp_files(&[PathBuf::from("/nonexistent/audio_missing.mp3")])
            .await;
    }
}
