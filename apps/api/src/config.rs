use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{self, LlmConfig};
use crate::mailbox::client::{self as mailbox_client, GmailConfig};
use crate::pipeline::retry::{Backoff, RetryPolicy};
use crate::pipeline::PipelineSettings;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub evaluator_api_url: String,
    pub evaluator_model: String,
    pub evaluator_max_tokens: u32,
    pub evaluator_temperature: f32,
    pub evaluator_timeout_secs: u64,
    /// Mailbox sourcing is disabled when unset.
    pub gmail_access_token: Option<String>,
    pub gmail_api_url: String,
    pub uploads_dir: String,
    pub evaluation_delay_secs: u64,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_backoff_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            evaluator_api_url: env_or("EVALUATOR_API_URL", llm_client::DEFAULT_API_URL),
            evaluator_model: env_or("EVALUATOR_MODEL", llm_client::DEFAULT_MODEL),
            evaluator_max_tokens: parse_env("EVALUATOR_MAX_TOKENS", 2048)?,
            evaluator_temperature: parse_env("EVALUATOR_TEMPERATURE", 0.2)?,
            evaluator_timeout_secs: parse_env("EVALUATOR_TIMEOUT_SECS", 120)?,
            gmail_access_token: std::env::var("GMAIL_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            gmail_api_url: env_or("GMAIL_API_URL", mailbox_client::DEFAULT_API_URL),
            uploads_dir: env_or("UPLOADS_DIR", "uploads"),
            evaluation_delay_secs: parse_env("EVALUATION_DELAY_SECS", 4)?,
            rate_limit_max_attempts: parse_env("RATE_LIMIT_MAX_ATTEMPTS", 3)?,
            rate_limit_backoff_secs: parse_env("RATE_LIMIT_BACKOFF_SECS", 10)?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_url: self.evaluator_api_url.clone(),
            model: self.evaluator_model.clone(),
            max_tokens: self.evaluator_max_tokens,
            temperature: self.evaluator_temperature,
            timeout: Duration::from_secs(self.evaluator_timeout_secs),
            ..LlmConfig::new(self.anthropic_api_key.clone())
        }
    }

    pub fn gmail_config(&self) -> Option<GmailConfig> {
        self.gmail_access_token.as_ref().map(|token| GmailConfig {
            api_url: self.gmail_api_url.clone(),
            ..GmailConfig::new(token.clone())
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            evaluation_delay: Duration::from_secs(self.evaluation_delay_secs),
            rate_limit_retry: RetryPolicy {
                max_attempts: self.rate_limit_max_attempts.max(1),
                backoff: Backoff::Fixed(Duration::from_secs(self.rate_limit_backoff_secs)),
            },
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
