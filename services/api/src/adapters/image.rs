//! services/api/src/adapters/image.rs
//!
//! Adapter implementing the `ImageGenerationService` port. Backends are
//! tried in a fixed preference order: DALL-E, then Stability AI, then a
//! placeholder image URL. Every result carries `is_placeholder` so callers
//! always know which kind of URL they got.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storybook_core::domain::{GeneratedImage, ImageOptions};
use storybook_core::ports::{ImageGenerationService, PortError, PortResult};
use tracing::warn;

const DALLE_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";
const STABILITY_ENDPOINT: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-v1-6/text-to-image";
const PLACEHOLDER_BASE: &str = "https://via.placeholder.com/1024x1024/87CEEB/000000";

/// Delay between sequential batch calls, to stay under upstream rate limits.
const BATCH_DELAY: Duration = Duration::from_secs(2);

//=========================================================================================
// Wire types
//=========================================================================================

#[derive(Serialize)]
struct DalleRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    quality: &'a str,
}

#[derive(Deserialize)]
struct DalleResponse {
    data: Vec<DalleImage>,
}

#[derive(Deserialize)]
struct DalleImage {
    url: String,
}

#[derive(Serialize)]
struct StabilityRequest<'a> {
    text_prompts: Vec<StabilityPrompt<'a>>,
    cfg_scale: u32,
    height: u32,
    width: u32,
    samples: u32,
    steps: u32,
}

#[derive(Serialize)]
struct StabilityPrompt<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct StabilityResponse {
    artifacts: Vec<StabilityArtifact>,
}

#[derive(Deserialize)]
struct StabilityArtifact {
    base64: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that generates illustrations via hosted image models.
pub struct ImageAdapter {
    http: reqwest::Client,
    openai_api_key: Option<String>,
    stability_api_key: Option<String>,
}

impl ImageAdapter {
    pub fn new(openai_api_key: Option<String>, stability_api_key: Option<String>) -> Self {
        if openai_api_key.is_none() && stability_api_key.is_none() {
            warn!("No image generation API keys configured; images will be placeholders");
        }
        Self {
            http: reqwest::Client::new(),
            openai_api_key,
            stability_api_key,
        }
    }

    async fn generate_with_dalle(
        &self,
        api_key: &str,
        prompt: &str,
        options: &ImageOptions,
    ) -> PortResult<GeneratedImage> {
        let size = options.size.as_deref().unwrap_or("1024x1024");
        let styled_prompt = match options.style.as_deref() {
            Some(style) => format!("{}, {}", prompt, style),
            None => prompt.to_string(),
        };

        let response = self
            .http
            .post(DALLE_ENDPOINT)
            .bearer_auth(api_key)
            .json(&DalleRequest {
                model: "dall-e-3",
                prompt: &styled_prompt,
                n: 1,
                size,
                quality: "standard",
            })
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("DALL-E request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "DALL-E returned status {}",
                response.status()
            )));
        }

        let body: DalleResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("DALL-E response malformed: {}", e)))?;
        let url = body
            .data
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or_else(|| PortError::Upstream("DALL-E returned no images".to_string()))?;

        Ok(GeneratedImage {
            url,
            service: "dalle".to_string(),
            prompt: prompt.to_string(),
            is_placeholder: false,
        })
    }

    async fn generate_with_stability(
        &self,
        api_key: &str,
        prompt: &str,
    ) -> PortResult<GeneratedImage> {
        let response = self
            .http
            .post(STABILITY_ENDPOINT)
            .bearer_auth(api_key)
            .json(&StabilityRequest {
                text_prompts: vec![StabilityPrompt { text: prompt }],
                cfg_scale: 7,
                height: 1024,
                width: 1024,
                samples: 1,
                steps: 30,
            })
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Stability request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PortError::Upstream(format!(
                "Stability returned status {}",
                response.status()
            )));
        }

        let body: StabilityResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("Stability response malformed: {}", e)))?;
        let artifact = body
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| PortError::Upstream("Stability returned no artifacts".to_string()))?;

        Ok(GeneratedImage {
            // Stability returns raw bytes; the data URL keeps the port
            // contract of "a URL per image".
            url: format!("data:image/png;base64,{}", artifact.base64),
            service: "stability".to_string(),
            prompt: prompt.to_string(),
            is_placeholder: false,
        })
    }

    /// Builds the deterministic placeholder result for a prompt.
    pub fn placeholder_image(prompt: &str) -> GeneratedImage {
        let text: String = prompt.chars().take(50).collect();
        let url = Url::parse_with_params(PLACEHOLDER_BASE, &[("text", text.as_str())])
            .map(|u| u.to_string())
            .unwrap_or_else(|_| PLACEHOLDER_BASE.to_string());
        GeneratedImage {
            url,
            service: "placeholder".to_string(),
            prompt: prompt.to_string(),
            is_placeholder: true,
        }
    }
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for ImageAdapter {
    async fn generate_image(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> PortResult<GeneratedImage> {
        if let Some(key) = &self.openai_api_key {
            match self.generate_with_dalle(key, prompt, options).await {
                Ok(image) => return Ok(image),
                Err(error) => warn!("DALL-E generation failed, trying next backend: {}", error),
            }
        }

        if let Some(key) = &self.stability_api_key {
            match self.generate_with_stability(key, prompt).await {
                Ok(image) => return Ok(image),
                Err(error) => {
                    warn!("Stability generation failed, falling back to placeholder: {}", error)
                }
            }
        }

        Ok(Self::placeholder_image(prompt))
    }

    async fn generate_batch(
        &self,
        prompts: &[String],
        options: &ImageOptions,
    ) -> Vec<GeneratedImage> {
        let mut images = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(BATCH_DELAY).await;
            }
            match self.generate_image(prompt, options).await {
                Ok(image) => images.push(image),
                Err(error) => {
                    warn!("Batch image {} failed: {}", index + 1, error);
                    images.push(Self::placeholder_image(prompt));
                }
            }
        }
        images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_url_embeds_truncated_prompt() {
        let long_prompt = "a".repeat(80);
        let image = ImageAdapter::placeholder_image(&long_prompt);
        assert!(image.is_placeholder);
        assert_eq!(image.service, "placeholder");
        let expected_text: String = long_prompt.chars().take(50).collect();
        assert!(image.url.contains(&expected_text));
        assert!(image.url.starts_with("https://via.placeholder.com/"));
    }

    #[tokio::test]
    async fn test_unconfigured_adapter_returns_placeholder() {
        let adapter = ImageAdapter::new(None, None);
        let image = adapter
            .generate_image("a dragon reading a book", &ImageOptions::default())
            .await
            .unwrap();
        assert!(image.is_placeholder);
        assert_eq!(image.prompt, "a dragon reading a book");
    }

    #[tokio::test]
    async fn test_unconfigured_batch_yields_one_placeholder_per_prompt() {
        let adapter = ImageAdapter::new(None, None);
        let prompts = vec!["first scene".to_string(), "second scene".to_string()];
        let images = adapter
            .generate_batch(&prompts, &ImageOptions::default())
            .await;
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|image| image.is_placeholder));
        assert_eq!(images[0].prompt, "first scene");
        assert_eq!(images[1].prompt, "second scene");
    }
}
