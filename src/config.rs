//! Client configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development.

use std::env;
use std::time::Duration;

/// Default delay before a stats write is reconciled against the stored row.
const DEFAULT_RECONCILE_DELAY_MS: u64 = 500;

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project base URL (e.g. `https://xyz.supabase.co`)
    pub supabase_url: String,
    /// Public anon key sent as `apikey` on every request
    pub supabase_anon_key: String,
    /// Table holding one profile row per identity
    pub profiles_table: String,
    /// Path to the static chapter catalog (JSON)
    pub chapter_catalog_path: String,
    /// Delay before re-fetching the profile after a stats write
    pub reconcile_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let supabase_url = env::var("SUPABASE_URL")
            .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?
            .trim_end_matches('/')
            .to_string();

        let reconcile_delay_ms = match env::var("RECONCILE_DELAY_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("RECONCILE_DELAY_MS", raw))?,
            Err(_) => DEFAULT_RECONCILE_DELAY_MS,
        };

        Ok(Self {
            supabase_url,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            profiles_table: env::var("PROFILES_TABLE")
                .unwrap_or_else(|_| crate::db::tables::PROFILES.to_string()),
            chapter_catalog_path: env::var("CHAPTER_CATALOG_PATH")
                .unwrap_or_else(|_| "data/chapters.json".to_string()),
            reconcile_delay: Duration::from_millis(reconcile_delay_ms),
        })
    }

    /// Config for tests and offline runs.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            profiles_table: crate::db::tables::PROFILES.to_string(),
            chapter_catalog_path: "data/chapters.json".to_string(),
            reconcile_delay: Duration::from_millis(DEFAULT_RECONCILE_DELAY_MS),
        }
    }

    /// Base URL of the auth endpoints.
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    /// Base URL of the REST (table) endpoints.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
