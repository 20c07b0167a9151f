use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub voice_api_key: String,
    pub voice_base_url: String,
    pub voice_assistant_id: String,
    pub max_parallel_calls: usize,
    pub data_dir: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            voice_api_key: require_env("VOICE_API_KEY")?,
            voice_base_url: std::env::var("VOICE_BASE_URL")
                .unwrap_or_else(|_| "https://api.vapi.ai".to_string()),
            voice_assistant_id: require_env("VOICE_ASSISTANT_ID")?,
            max_parallel_calls: std::env::var("MAX_PARALLEL_CALLS")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<usize>()
                .context("MAX_PARALLEL_CALLS must be a positive integer")?,
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
