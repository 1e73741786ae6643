use anyhow::{Context, Result};
use std::env;

use crate::qa::retrieval::RetrievalOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Pipeline tuning passed explicitly into the pipeline constructor.
///
/// Kept out of global state so tests and callers can vary the oracle model,
/// token caps, and retrieval thresholds per instance.
#[derive(Debug, Clone)]
pub struct QaOptions {
    /// Which oracle model to request.
    pub model_name: String,
    /// Output cap for the classification call.
    pub classify_max_tokens: u32,
    /// Output cap for the answer call; answers are short grounded summaries.
    pub answer_max_tokens: u32,
    /// Fuzzy-retrieval thresholds and caps.
    pub retrieval: RetrievalOptions,
}

impl Default for QaOptions {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o-mini".to_string(),
            classify_max_tokens: 300,
            answer_max_tokens: 400,
            retrieval: RetrievalOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // LLM oracle
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_timeout_seconds: u64,

    // Pipeline tuning
    pub qa: QaOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = env::var("REDIS_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600); // 1 hour default

        // LLM oracle
        let llm_api_url =
            env::var("LLM_API_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let llm_api_key = env::var("LLM_API_KEY").context("LLM_API_KEY must be set")?;
        let llm_timeout_seconds = env::var("LLM_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        // Pipeline tuning
        let defaults = QaOptions::default();
        let qa = QaOptions {
            model_name: env::var("LLM_MODEL").unwrap_or(defaults.model_name),
            classify_max_tokens: env::var("CLASSIFY_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.classify_max_tokens),
            answer_max_tokens: env::var("ANSWER_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.answer_max_tokens),
            retrieval: defaults.retrieval,
        };

        Ok(Settings {
            env,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            llm_api_url,
            llm_api_key,
            llm_timeout_seconds,
            qa,
        })
    }
}
