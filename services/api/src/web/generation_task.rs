//! services/api/src/web/generation_task.rs
//!
//! The three-phase story generation pipeline, spawned detached from the
//! request that starts it. Phase 1 writes the story text, phase 2 fills in
//! page illustrations, phase 3 marks the run complete. Each phase persists
//! before the next begins, so the status endpoint always reports a
//! consistent snapshot.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use storybook_core::domain::{
    GeneratedStory, ImageOptions, Story, StoryMetadata, StoryOptions, StoryPage, StoryStatus,
};
use storybook_core::ports::{
    DatabaseService, ImageGenerationService, PortResult, TextGenerationService,
};
use tracing::{error, info, warn};

use crate::web::state::AppState;

//=========================================================================================
// GenerationContext
//=========================================================================================

/// The pipeline's dependencies, captured explicitly so tests can substitute
/// any of them.
#[derive(Clone)]
pub struct GenerationContext {
    pub db: Arc<dyn DatabaseService>,
    pub text: Arc<dyn TextGenerationService>,
    pub images: Arc<dyn ImageGenerationService>,
    pub image_concurrency: usize,
}

impl GenerationContext {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            text: state.text_adapter.clone(),
            images: state.image_adapter.clone(),
            image_concurrency: state.config.image_concurrency,
        }
    }
}

/// The fallback illustration for a page whose generation failed or came
/// back as a placeholder. `page_number` is 1-based.
pub fn fallback_image_url(page_number: usize) -> String {
    format!("https://picsum.photos/800/600?random={}", page_number)
}

//=========================================================================================
// Pipeline entry point
//=========================================================================================

/// Runs the full pipeline and records failures on the story record. This is
/// the function handed to `tokio::spawn`; it never panics the task over a
/// generation error.
pub async fn run_generation(
    ctx: GenerationContext,
    story_id: String,
    prompt: String,
    options: StoryOptions,
) {
    if let Err(e) = generate_complete_story(&ctx, &story_id, &prompt, &options).await {
        error!("Story generation failed for {}: {:?}", story_id, e);
        // Best effort: a failed status write must not mask the original error.
        if let Err(status_err) = ctx
            .db
            .update_story_status(&story_id, StoryStatus::Failed)
            .await
        {
            error!(
                "Could not mark story {} as failed: {:?}",
                story_id, status_err
            );
        }
    }
}

async fn generate_complete_story(
    ctx: &GenerationContext,
    story_id: &str,
    prompt: &str,
    options: &StoryOptions,
) -> PortResult<()> {
    let mut story = ctx.db.get_story(story_id).await?;

    // --- Phase 1: story text ---
    info!("Generating story text for {}", story_id);
    let generated = ctx.text.generate_story(prompt, options).await?;
    apply_generated_text(&mut story, generated, options);
    story.progress.story_generated = true;
    story.status = StoryStatus::Generating;
    story = ctx.db.save_story(&story).await?;

    // --- Phase 2: page illustrations ---
    info!("Generating images for {} pages of {}", story.pages.len(), story_id);
    let art_style = story
        .metadata
        .art_style
        .clone()
        .unwrap_or_else(|| "colorful and vibrant".to_string());

    // Owned (index, prompt) pairs; the stream must not borrow the story it
    // later writes back into, and the spawned future has to be 'static.
    let prompts: Vec<(usize, String)> = story
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            (
                index,
                format!(
                    "Children's story book illustration for a page with text: \"{}\". Style: {}.",
                    page.text, art_style
                ),
            )
        })
        .collect();

    let results: Vec<(usize, String)> = stream::iter(prompts)
        .map(|(index, image_prompt)| {
            let images = ctx.images.clone();
            async move {
                let url = match images
                    .generate_image(&image_prompt, &ImageOptions::default())
                    .await
                {
                    Ok(image) if !image.is_placeholder => image.url,
                    Ok(_) => fallback_image_url(index + 1),
                    Err(e) => {
                        warn!("Failed to generate image for page {}: {}", index + 1, e);
                        fallback_image_url(index + 1)
                    }
                };
                (index, url)
            }
        })
        .buffer_unordered(ctx.image_concurrency.max(1))
        .collect()
        .await;
    for (index, url) in results {
        story.pages[index].image_url = Some(url);
    }
    story.progress.images_generated = true;
    story = ctx.db.save_story(&story).await?;

    // --- Phase 3: narration ---
    // Synthesis is deferred to the direct audio endpoint; the pipeline only
    // records the phase as done.
    info!("Skipping audio generation for {}", story_id);
    story.progress.audio_generated = true;
    story.progress.completed = true;
    story.status = StoryStatus::Completed;
    ctx.db.save_story(&story).await?;

    info!("Story generation completed for {}", story_id);
    Ok(())
}

fn apply_generated_text(story: &mut Story, generated: GeneratedStory, options: &StoryOptions) {
    story.title = generated.title;
    story.pages = generated
        .pages
        .into_iter()
        .map(|page| StoryPage {
            page_number: page.page_number,
            title: page.title,
            text: page.text,
            image_prompt: page.image_prompt,
            image_url: None,
            audio_url: None,
        })
        .collect();
    story.metadata = StoryMetadata {
        genre: generated.metadata.genre,
        age_group: generated.metadata.age_group,
        mood: generated.metadata.mood,
        art_style: options.art_style.clone(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::image::ImageAdapter;
    use crate::adapters::memory::MemoryStore;
    use crate::adapters::story_llm::OpenAiStoryAdapter;
    use async_trait::async_trait;
    use storybook_core::domain::{GeneratedImage, NewStory};
    use storybook_core::ports::PortError;

    struct FailingTextService;

    #[async_trait]
    impl TextGenerationService for FailingTextService {
        async fn generate_story(
            &self,
            _prompt: &str,
            _options: &StoryOptions,
        ) -> PortResult<GeneratedStory> {
            Err(PortError::Parse("No valid JSON found in response".to_string()))
        }
    }

    /// Succeeds with a real-looking URL except for the listed page indexes.
    struct SelectiveImageService {
        failing_indexes: Vec<usize>,
    }

    #[async_trait]
    impl ImageGenerationService for SelectiveImageService {
        async fn generate_image(
            &self,
            prompt: &str,
            _options: &ImageOptions,
        ) -> PortResult<GeneratedImage> {
            // The pipeline embeds the page text in each prompt; tests encode
            // the page number in that text.
            let failing = self
                .failing_indexes
                .iter()
                .any(|index| prompt.contains(&format!("sentence {}", index + 1)));
            if failing {
                Err(PortError::Upstream("backend down".to_string()))
            } else {
                Ok(GeneratedImage {
                    url: "https://images.example.com/real.png".to_string(),
                    service: "dalle".to_string(),
                    prompt: prompt.to_string(),
                    is_placeholder: false,
                })
            }
        }

        async fn generate_batch(
            &self,
            prompts: &[String],
            options: &ImageOptions,
        ) -> Vec<GeneratedImage> {
            let mut images = Vec::new();
            for prompt in prompts {
                if let Ok(image) = self.generate_image(prompt, options).await {
                    images.push(image);
                }
            }
            images
        }
    }

    struct NumberedTextService {
        pages: u32,
    }

    #[async_trait]
    impl TextGenerationService for NumberedTextService {
        async fn generate_story(
            &self,
            _prompt: &str,
            _options: &StoryOptions,
        ) -> PortResult<GeneratedStory> {
            use storybook_core::domain::{GeneratedMetadata, GeneratedPage};
            Ok(GeneratedStory {
                title: "Numbered".to_string(),
                pages: (1..=self.pages)
                    .map(|n| GeneratedPage {
                        page_number: n,
                        title: format!("Page {}", n),
                        text: format!("sentence {}", n),
                        image_prompt: String::new(),
                    })
                    .collect(),
                metadata: GeneratedMetadata::default(),
            })
        }
    }

    async fn seed_story(db: &MemoryStore, prompt: &str) -> String {
        db.create_story(NewStory {
            title: "Generating...".to_string(),
            prompt: prompt.to_string(),
            user_id: None,
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_offline_run_completes_with_fallback_images() {
        let db = Arc::new(MemoryStore::new());
        let ctx = GenerationContext {
            db: db.clone(),
            text: Arc::new(OpenAiStoryAdapter::new(None, "gpt-4o-mini".to_string())),
            images: Arc::new(ImageAdapter::new(None, None)),
            image_concurrency: 4,
        };

        let story_id = seed_story(&db, "a shy dragon who sings").await;
        let options = StoryOptions {
            pages: Some(4),
            genre: Some("fantasy".to_string()),
            ..Default::default()
        };
        run_generation(ctx, story_id.clone(), "a shy dragon who sings".to_string(), options)
            .await;

        let story = db.get_story(&story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Completed);
        assert!(story.progress.story_generated);
        assert!(story.progress.images_generated);
        assert!(story.progress.audio_generated);
        assert!(story.progress.completed);
        assert_eq!(story.pages.len(), 4);
        for (index, page) in story.pages.iter().enumerate() {
            assert_eq!(
                page.image_url.as_deref(),
                Some(fallback_image_url(index + 1).as_str())
            );
            assert!(page.audio_url.is_none());
        }
        assert_eq!(story.metadata.genre.as_deref(), Some("fantasy"));
    }

    #[tokio::test]
    async fn test_text_failure_marks_story_failed() {
        let db = Arc::new(MemoryStore::new());
        let ctx = GenerationContext {
            db: db.clone(),
            text: Arc::new(FailingTextService),
            images: Arc::new(ImageAdapter::new(None, None)),
            image_concurrency: 4,
        };

        let story_id = seed_story(&db, "anything").await;
        run_generation(ctx, story_id.clone(), "anything".to_string(), StoryOptions::default())
            .await;

        let story = db.get_story(&story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Failed);
        assert!(!story.progress.story_generated);
        assert!(story.pages.is_empty());
    }

    #[tokio::test]
    async fn test_single_page_image_failure_is_isolated() {
        let db = Arc::new(MemoryStore::new());
        let ctx = GenerationContext {
            db: db.clone(),
            text: Arc::new(NumberedTextService { pages: 3 }),
            images: Arc::new(SelectiveImageService {
                failing_indexes: vec![1],
            }),
            image_concurrency: 2,
        };

        let story_id = seed_story(&db, "numbered").await;
        run_generation(ctx, story_id.clone(), "numbered".to_string(), StoryOptions::default())
            .await;

        let story = db.get_story(&story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Completed);
        assert_eq!(
            story.pages[0].image_url.as_deref(),
            Some("https://images.example.com/real.png")
        );
        assert_eq!(
            story.pages[1].image_url.as_deref(),
            Some(fallback_image_url(2).as_str())
        );
        assert_eq!(
            story.pages[2].image_url.as_deref(),
            Some("https://images.example.com/real.png")
        );
    }

    #[tokio::test]
    async fn test_pipeline_runs_detached_on_a_spawned_task() {
        let db = Arc::new(MemoryStore::new());
        let ctx = GenerationContext {
            db: db.clone(),
            text: Arc::new(OpenAiStoryAdapter::new(None, "gpt-4o-mini".to_string())),
            images: Arc::new(ImageAdapter::new(None, None)),
            image_concurrency: 4,
        };

        let story_id = seed_story(&db, "a spawned run").await;
        let options = StoryOptions {
            pages: Some(4),
            ..Default::default()
        };
        // The handler hands the future to tokio::spawn, so it must be
        // 'static and Send end to end.
        tokio::spawn(run_generation(
            ctx,
            story_id.clone(),
            "a spawned run".to_string(),
            options,
        ))
        .await
        .unwrap();

        let story = db.get_story(&story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Completed);
        assert_eq!(story.pages.len(), 4);
    }

    #[tokio::test]
    async fn test_page_count_boundaries() {
        for pages in [4u32, 16] {
            let db = Arc::new(MemoryStore::new());
            let ctx = GenerationContext {
                db: db.clone(),
                text: Arc::new(OpenAiStoryAdapter::new(None, "gpt-4o-mini".to_string())),
                images: Arc::new(ImageAdapter::new(None, None)),
                image_concurrency: 8,
            };

            let story_id = seed_story(&db, "boundaries").await;
            let options = StoryOptions {
                pages: Some(pages),
                ..Default::default()
            };
            run_generation(ctx, story_id.clone(), "boundaries".to_string(), options).await;

            let story = db.get_story(&story_id).await.unwrap();
            assert_eq!(story.status, StoryStatus::Completed);
            assert_eq!(story.pages.len(), pages as usize);
        }
    }
}
