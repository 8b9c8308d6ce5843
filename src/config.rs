use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use config;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    pub db_pool_size: u32,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub site_url: String,
    pub email_api_key: Option<String>,
    pub email_from: Option<String>,
    pub email_api_url: String,
    pub email_batch_size: usize,
    pub email_batch_delay_ms: u64,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.", name
    )))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// The session key must be 128 hex characters (64 bytes).
pub fn validate_session_key(key: &str) -> Result<(), config::ConfigError> {
    if key.len() != 128 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(config::ConfigError::Message(
            "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
        ));
    }
    Ok(())
}

pub fn validate_site_url(site_url: &str) -> Result<(), config::ConfigError> {
    if !(site_url.starts_with("http://") || site_url.starts_with("https://")) {
        return Err(config::ConfigError::Message(format!(
            "FATAL: 'SITE_URL' must be an absolute http(s) URL, got '{}'.", site_url
        )));
    }
    Ok(())
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = required_var("DATABASE_PATH")?;
        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        let session_secret_key = required_var("SESSION_SECRET_KEY")?;
        validate_session_key(&session_secret_key)?;

        let site_url = required_var("SITE_URL")?.trim_end_matches('/').to_string();
        validate_site_url(&site_url)?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let mut builder = config::Config::builder()
            // Web host/port, pool size and email batching defaults.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("site_url", site_url)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?;

        if let Some(api_key) = optional_var("EMAIL_API_KEY") {
            builder = builder.set_override("email_api_key", api_key)?;
        }
        if let Some(sender) = optional_var("EMAIL_FROM") {
            builder = builder.set_override("email_from", sender)?;
        }
        if let Some(api_url) = optional_var("EMAIL_API_URL") {
            builder = builder.set_override("email_api_url", api_url)?;
        }
        if let Some(size) = optional_var("EMAIL_BATCH_SIZE") {
            let size = size.parse::<u32>().map_err(|_| config::ConfigError::Message(
                "FATAL: 'EMAIL_BATCH_SIZE' must be a positive whole number.".to_string()
            ))?;
            builder = builder.set_override("email_batch_size", size.max(1) as i64)?;
        }
        if let Some(delay) = optional_var("EMAIL_BATCH_DELAY_MS") {
            let delay = delay.parse::<u32>().map_err(|_| config::ConfigError::Message(
                "FATAL: 'EMAIL_BATCH_DELAY_MS' must be a whole number of milliseconds.".to_string()
            ))?;
            builder = builder.set_override("email_batch_delay_ms", delay as i64)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn database_file(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
    }

    pub fn email_batch_delay(&self) -> Duration {
        Duration::from_millis(self.email_batch_delay_ms)
    }
}
