use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use orchestrator::conversation::{DEFAULT_FALLBACK_ANSWER, DEFAULT_MAX_FOLLOWUP_ROUNDS};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub session_cookie: String,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub max_followup_rounds: usize,
    pub fallback_answer: String,
    pub app_structure_path: Option<PathBuf>,
    pub attachment_base_url: String,
    pub attachment_secret: String,
    pub attachment_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env_or("API_BIND_ADDR", "0.0.0.0:6813")
            .parse()
            .context("API_BIND_ADDR must be a socket address")?;
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let jwt_secret = std::env::var("API_JWT_SECRET")
            .or_else(|_| std::env::var("AUTH_JWT_SECRET"))
            .map_err(|_| anyhow::anyhow!("API_JWT_SECRET environment variable is required"))?;
        let attachment_secret =
            std::env::var("ATTACHMENT_URL_SECRET").unwrap_or_else(|_| jwt_secret.clone());

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections: parsed_or("API_DATABASE_MAX_CONNECTIONS", 10),
            jwt_issuer: env_or("API_JWT_ISSUER", "maintenance-ops"),
            jwt_secret,
            session_cookie: env_or("API_SESSION_COOKIE", "session"),
            llm_base_url: env_or("LLM_SERVER_URL", "https://api.openai.com"),
            llm_api_key: std::env::var("LLM_API_KEY").ok().filter(|key| !key.is_empty()),
            llm_model: env_or("LLM_MODEL", "gpt-4o-mini"),
            llm_timeout: Duration::from_secs(parsed_or("LLM_HTTP_TIMEOUT_SECS", 60)),
            max_followup_rounds: parsed_or("CHAT_MAX_FOLLOWUP_ROUNDS", DEFAULT_MAX_FOLLOWUP_ROUNDS),
            fallback_answer: env_or("CHAT_FALLBACK_ANSWER", DEFAULT_FALLBACK_ANSWER),
            app_structure_path: std::env::var("APP_STRUCTURE_PATH").ok().map(PathBuf::from),
            attachment_base_url: env_or("ATTACHMENT_BASE_URL", "http://localhost:6813/files"),
            attachment_secret,
            attachment_ttl: Duration::from_secs(parsed_or("ATTACHMENT_URL_TTL_SECS", 900)),
        })
    }
}

/// Reads the opaque application-structure description, if one is configured.
pub async fn load_app_structure(path: Option<&PathBuf>) -> anyhow::Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read application structure from {}", path.display()))?;
    Ok(Some(text))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}
