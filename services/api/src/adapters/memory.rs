//! services/api/src/adapters/memory.rs
//!
//! A process-local, in-memory implementation of the `DatabaseService` port,
//! used when no durable store is reachable at startup. Data is lost on
//! process restart. Ids come from a monotonically increasing counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use storybook_core::domain::{
    AuthSession, GenerationProgress, NewStory, Story, StoryFilter, StoryMetadata, StoryStatus,
    Subscription, User, UserCredentials, UserPreferences,
};
use storybook_core::ports::{DatabaseService, PortError, PortResult};
use tokio::sync::RwLock;

struct StoredUser {
    user: User,
    password_hash: String,
}

/// In-memory store. Interior mutability via `RwLock`; correctness assumes a
/// single-process deployment.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, StoredUser>>,
    stories: RwLock<HashMap<String, Story>>,
    sessions: RwLock<HashMap<String, AuthSession>>,
    user_counter: AtomicU64,
    story_counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_user_id(&self) -> String {
        (self.user_counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn next_story_id(&self) -> String {
        (self.story_counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

#[async_trait]
impl DatabaseService for MemoryStore {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.user.email == email) {
            return Err(PortError::Validation("User already exists".to_string()));
        }
        let user = User {
            id: self.next_user_id(),
            name: name.to_string(),
            email: email.to_string(),
            preferences: UserPreferences::default(),
            subscription: Subscription::default(),
            created_at: Utc::now(),
        };
        users.insert(
            user.id.clone(),
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> PortResult<User> {
        self.users
            .read()
            .await
            .get(user_id)
            .map(|stored| stored.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.users
            .read()
            .await
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| UserCredentials {
                id: stored.user.id.clone(),
                email: stored.user.email.clone(),
                password_hash: stored.password_hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn update_user_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        preferences: Option<UserPreferences>,
    ) -> PortResult<User> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        if let Some(name) = name {
            stored.user.name = name.to_string();
        }
        if let Some(preferences) = preferences {
            stored.user.preferences = preferences;
        }
        Ok(stored.user.clone())
    }

    async fn update_user_password(&self, user_id: &str, password_hash: &str) -> PortResult<()> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        stored.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> PortResult<bool> {
        Ok(self.users.write().await.remove(user_id).is_some())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.sessions.write().await.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<String> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| PortError::NotFound("Session not found".to_string()))?;
        if session.expires_at < Utc::now() {
            return Err(PortError::AccessDenied);
        }
        Ok(session.user_id.clone())
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn create_story(&self, story: NewStory) -> PortResult<Story> {
        let now = Utc::now();
        let record = Story {
            id: self.next_story_id(),
            share_id: None,
            title: story.title,
            prompt: story.prompt,
            user_id: story.user_id,
            pages: Vec::new(),
            metadata: StoryMetadata::default(),
            status: StoryStatus::Generating,
            is_public: false,
            progress: GenerationProgress::default(),
            created_at: now,
            updated_at: now,
        };
        self.stories
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_story(&self, story_id: &str) -> PortResult<Story> {
        self.stories
            .read()
            .await
            .get(story_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story_id)))
    }

    async fn get_story_by_share_id(&self, share_id: &str) -> PortResult<Story> {
        self.stories
            .read()
            .await
            .values()
            .find(|story| story.share_id.as_deref() == Some(share_id))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", share_id)))
    }

    async fn save_story(&self, story: &Story) -> PortResult<Story> {
        let mut stories = self.stories.write().await;
        if !stories.contains_key(&story.id) {
            return Err(PortError::NotFound(format!("Story {} not found", story.id)));
        }
        let mut updated = story.clone();
        updated.updated_at = Utc::now();
        stories.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn update_story_status(&self, story_id: &str, status: StoryStatus) -> PortResult<()> {
        let mut stories = self.stories.write().await;
        let story = stories
            .get_mut(story_id)
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story_id)))?;
        story.status = status;
        story.updated_at = Utc::now();
        Ok(())
    }

    async fn list_stories(
        &self,
        filter: StoryFilter,
        page: u32,
        limit: u32,
    ) -> PortResult<(Vec<Story>, u64)> {
        let stories = self.stories.read().await;
        let mut matches: Vec<Story> = stories
            .values()
            .filter(|story| {
                filter
                    .user_id
                    .as_ref()
                    .map_or(true, |uid| story.user_id.as_ref() == Some(uid))
                    && filter.is_public.map_or(true, |p| story.is_public == p)
                    && filter.status.map_or(true, |s| story.status == s)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len() as u64;
        let skip = (page.max(1) as usize - 1) * limit as usize;
        let records = matches
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect();
        Ok((records, total))
    }

    async fn delete_story(&self, story_id: &str) -> PortResult<bool> {
        Ok(self.stories.write().await.remove(story_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_story(prompt: &str, user_id: Option<&str>) -> NewStory {
        NewStory {
            title: "Generating...".to_string(),
            prompt: prompt.to_string(),
            user_id: user_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_story_ids_are_sequential() {
        let store = MemoryStore::new();
        let first = store.create_story(new_story("a", None)).await.unwrap();
        let second = store.create_story(new_story("b", None)).await.unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");
    }

    #[tokio::test]
    async fn test_new_story_starts_generating() {
        let store = MemoryStore::new();
        let story = store.create_story(new_story("a", None)).await.unwrap();
        assert_eq!(story.status, StoryStatus::Generating);
        assert!(!story.is_public);
        assert!(story.share_id.is_none());
        assert!(story.pages.is_empty());
        assert!(!story.progress.story_generated);
    }

    #[tokio::test]
    async fn test_save_story_round_trips() {
        let store = MemoryStore::new();
        let mut story = store.create_story(new_story("a", None)).await.unwrap();
        story.title = "The Shy Dragon".to_string();
        story.progress.story_generated = true;
        store.save_story(&story).await.unwrap();

        let loaded = store.get_story(&story.id).await.unwrap();
        assert_eq!(loaded.title, "The Shy Dragon");
        assert!(loaded.progress.story_generated);
    }

    #[tokio::test]
    async fn test_list_filters_by_owner_and_visibility() {
        let store = MemoryStore::new();
        let mine = store.create_story(new_story("a", Some("u1"))).await.unwrap();
        let mut public = store.create_story(new_story("b", Some("u2"))).await.unwrap();
        public.is_public = true;
        public.status = StoryStatus::Completed;
        store.save_story(&public).await.unwrap();

        let (own, total) = store
            .list_stories(
                StoryFilter {
                    user_id: Some("u1".to_string()),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(own[0].id, mine.id);

        let (published, total) = store
            .list_stories(
                StoryFilter {
                    is_public: Some(true),
                    status: Some(StoryStatus::Completed),
                    ..Default::default()
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(published[0].id, public.id);
    }

    #[tokio::test]
    async fn test_list_paginates_newest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut story = store
                .create_story(new_story(&format!("p{}", i), None))
                .await
                .unwrap();
            // Spread creation times so the sort is deterministic.
            story.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.save_story(&story).await.unwrap();
        }
        let (page_one, total) = store
            .list_stories(StoryFilter::default(), 1, 2)
            .await
            .unwrap();
        let (page_two, _) = store
            .list_stories(StoryFilter::default(), 2, 2)
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page_one.len(), 2);
        assert_eq!(page_two.len(), 2);
        assert!(page_one[0].created_at >= page_one[1].created_at);
        assert!(page_one[1].created_at >= page_two[0].created_at);
    }

    #[tokio::test]
    async fn test_share_id_lookup() {
        let store = MemoryStore::new();
        let mut story = store.create_story(new_story("a", None)).await.unwrap();
        story.share_id = Some("token".to_string());
        story.is_public = true;
        store.save_story(&story).await.unwrap();

        let found = store.get_story_by_share_id("token").await.unwrap();
        assert_eq!(found.id, story.id);
        assert!(store.get_story_by_share_id("other").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.create_user("A", "a@example.com", "hash").await.unwrap();
        let err = store
            .create_user("B", "a@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let store = MemoryStore::new();
        let user = store.create_user("A", "a@example.com", "hash").await.unwrap();
        store
            .create_auth_session("sid", &user.id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(store.validate_auth_session("sid").await.is_err());
    }
}
