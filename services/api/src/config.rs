//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Every external backend is optional:
//! a missing key switches the matching adapter to its fallback path.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the Cloudinary unsigned upload endpoint.
#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub upload_preset: String,
}

/// Credentials for Google Cloud Storage uploads.
#[derive(Clone, Debug)]
pub struct GcsConfig {
    pub bucket: String,
    pub access_token: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Connection string for the durable store. When absent or unreachable
    /// the service runs on the in-memory store instead.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub stability_api_key: Option<String>,
    pub cloudinary: Option<CloudinaryConfig>,
    pub gcs: Option<GcsConfig>,
    pub upload_dir: PathBuf,
    pub text_model: String,
    pub tts_voice: String,
    /// Concurrency limit for per-page image generation in the pipeline.
    pub image_concurrency: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let stability_api_key = std::env::var("STABILITY_AI_API_KEY").ok();

        let cloudinary = match (
            std::env::var("CLOUDINARY_CLOUD_NAME").ok(),
            std::env::var("CLOUDINARY_UPLOAD_PRESET").ok(),
        ) {
            (Some(cloud_name), Some(upload_preset)) => Some(CloudinaryConfig {
                cloud_name,
                upload_preset,
            }),
            _ => None,
        };

        let gcs = match (
            std::env::var("GCS_BUCKET_NAME").ok(),
            std::env::var("GCS_ACCESS_TOKEN").ok(),
        ) {
            (Some(bucket), Some(access_token)) => Some(GcsConfig {
                bucket,
                access_token,
            }),
            _ => None,
        };

        // --- Load Adapter-specific Settings ---
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));
        let text_model =
            std::env::var("TEXT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "nova".to_string());
        let image_concurrency = match std::env::var("IMAGE_CONCURRENCY") {
            Ok(raw) => raw.parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue(
                    "IMAGE_CONCURRENCY".to_string(),
                    format!("'{}' is not a positive integer", raw),
                )
            })?,
            Err(_) => 4,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            stability_api_key,
            cloudinary,
            gcs,
            upload_dir,
            text_model,
            tts_voice,
            image_concurrency,
        })
    }
}
