//! services/api/src/adapters/db.rs
//!
//! The durable-store implementation of the `DatabaseService` port, backed
//! by PostgreSQL via `sqlx`. Document-shaped fields (pages, metadata,
//! progress, preferences) live in JSONB columns so this backend and the
//! in-memory one expose identical record shapes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use storybook_core::domain::{
    GenerationProgress, NewStory, Story, StoryFilter, StoryMetadata, StoryPage, StoryStatus,
    Subscription, User, UserCredentials, UserPreferences,
};
use storybook_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

const STORY_COLUMNS: &str = "id, share_id, title, prompt, user_id, pages, metadata, status, \
                             is_public, progress, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the schema at startup when it does not exist yet.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                preferences JSONB NOT NULL,
                subscription JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS auth_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stories (
                id TEXT PRIMARY KEY,
                share_id TEXT UNIQUE,
                title TEXT NOT NULL,
                prompt TEXT NOT NULL,
                user_id TEXT,
                pages JSONB NOT NULL,
                metadata JSONB NOT NULL,
                status TEXT NOT NULL,
                is_public BOOLEAN NOT NULL DEFAULT FALSE,
                progress JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS stories_owner_idx ON stories (user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS stories_public_idx ON stories (is_public, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn persistence(error: sqlx::Error) -> PortError {
    PortError::Persistence(error.to_string())
}

fn push_story_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &StoryFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = &filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(is_public) = filter.is_public {
        builder.push(" AND is_public = ").push_bind(is_public);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    preferences: Json<UserPreferences>,
    subscription: Json<Subscription>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            preferences: self.preferences.0,
            subscription: self.subscription.0,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRow {
    id: String,
    email: String,
    password_hash: String,
}

impl CredentialsRow {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct StoryRow {
    id: String,
    share_id: Option<String>,
    title: String,
    prompt: String,
    user_id: Option<String>,
    pages: Json<Vec<StoryPage>>,
    metadata: Json<StoryMetadata>,
    status: String,
    is_public: bool,
    progress: Json<GenerationProgress>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoryRow {
    fn to_domain(self) -> PortResult<Story> {
        let status = StoryStatus::parse(&self.status)
            .ok_or_else(|| PortError::Persistence(format!("unknown status '{}'", self.status)))?;
        Ok(Story {
            id: self.id,
            share_id: self.share_id,
            title: self.title,
            prompt: self.prompt,
            user_id: self.user_id,
            pages: self.pages.0,
            metadata: self.metadata.0,
            status,
            is_public: self.is_public,
            progress: self.progress.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, name, email, password_hash, preferences, subscription)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, name, email, preferences, subscription, created_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(Json(UserPreferences::default()))
        .bind(Json(Subscription::default()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Validation("User already exists".to_string())
            }
            _ => persistence(e),
        })?;
        Ok(row.to_domain())
    }

    async fn get_user(&self, user_id: &str) -> PortResult<User> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, preferences, subscription, created_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(UserRow::to_domain)
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(CredentialsRow::to_domain)
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn update_user_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        preferences: Option<UserPreferences>,
    ) -> PortResult<User> {
        sqlx::query_as::<_, UserRow>(
            "UPDATE users
             SET name = COALESCE($2, name), preferences = COALESCE($3, preferences)
             WHERE id = $1
             RETURNING id, name, email, preferences, subscription, created_at",
        )
        .bind(user_id)
        .bind(name)
        .bind(preferences.map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(UserRow::to_domain)
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn update_user_password(&self, user_id: &str, password_hash: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<String> {
        sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PortError::NotFound("Session not found".to_string()))
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }

    async fn create_story(&self, story: NewStory) -> PortResult<Story> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "INSERT INTO stories (id, title, prompt, user_id, pages, metadata, status, is_public, progress)
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8)
             RETURNING {STORY_COLUMNS}"
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(story.title)
        .bind(story.prompt)
        .bind(story.user_id)
        .bind(Json(Vec::<StoryPage>::new()))
        .bind(Json(StoryMetadata::default()))
        .bind(StoryStatus::Generating.as_str())
        .bind(Json(GenerationProgress::default()))
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;
        row.to_domain()
    }

    async fn get_story(&self, story_id: &str) -> PortResult<Story> {
        sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE id = $1"
        ))
        .bind(story_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story_id)))?
        .to_domain()
    }

    async fn get_story_by_share_id(&self, share_id: &str) -> PortResult<Story> {
        sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE share_id = $1"
        ))
        .bind(share_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PortError::NotFound(format!("Story {} not found", share_id)))?
        .to_domain()
    }

    async fn save_story(&self, story: &Story) -> PortResult<Story> {
        sqlx::query_as::<_, StoryRow>(&format!(
            "UPDATE stories
             SET share_id = $2, title = $3, prompt = $4, user_id = $5, pages = $6,
                 metadata = $7, status = $8, is_public = $9, progress = $10, updated_at = now()
             WHERE id = $1
             RETURNING {STORY_COLUMNS}"
        ))
        .bind(&story.id)
        .bind(&story.share_id)
        .bind(&story.title)
        .bind(&story.prompt)
        .bind(&story.user_id)
        .bind(Json(&story.pages))
        .bind(Json(&story.metadata))
        .bind(story.status.as_str())
        .bind(story.is_public)
        .bind(Json(&story.progress))
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story.id)))?
        .to_domain()
    }

    async fn update_story_status(&self, story_id: &str, status: StoryStatus) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE stories SET status = $2, updated_at = now() WHERE id = $1")
                .bind(story_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(persistence)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Story {} not found", story_id)));
        }
        Ok(())
    }

    async fn list_stories(
        &self,
        filter: StoryFilter,
        page: u32,
        limit: u32,
    ) -> PortResult<(Vec<Story>, u64)> {
        let skip = (page.max(1) as i64 - 1) * limit as i64;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {STORY_COLUMNS} FROM stories"
        ));
        push_story_filters(&mut query, &filter);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(skip);
        let rows: Vec<StoryRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stories");
        push_story_filters(&mut count, &filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(persistence)?;

        let stories = rows
            .into_iter()
            .map(StoryRow::to_domain)
            .collect::<PortResult<Vec<_>>>()?;
        Ok((stories, total as u64))
    }

    async fn delete_story(&self, story_id: &str) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM stories WHERE id = $1")
            .bind(story_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(result.rows_affected() > 0)
    }
}
