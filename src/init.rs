use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use crate::analytics::AnalyticsSink;
use crate::error::{AppError, Result};
use crate::upstream::UpstreamClient;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub ai: AiConfig,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
}

impl AiConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("AI_GATEWAY_URL")
                .unwrap_or_else(|_| "https://ai.gateway.lovable.dev".to_string()),
            // The key is the one piece of configuration the relay cannot
            // run without.
            api_key: std::env::var("AI_GATEWAY_API_KEY")
                .map_err(|_| AppError::configuration("AI_GATEWAY_API_KEY not configured"))?,
            chat_model: std::env::var("CHAT_MODEL")
                .unwrap_or_else(|_| "google/gemini-2.5-flash".to_string()),
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| AppError::configuration(format!("Invalid PORT: {}", e)))?,
            database_url: std::env::var("DATABASE_URL").ok(),
            ai: AiConfig::from_env()?,
        })
    }
}

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub upstream: UpstreamClient,
    pub analytics: AnalyticsSink,
    pub config: AiConfig,
}

pub async fn app_init() -> Result<(Config, Arc<AppState>)> {
    let config = Config::from_env()?;
    log::info!("✅ Configuration loaded");

    // Analytics is a best-effort side channel: a missing or unreachable
    // database downgrades to a disabled sink instead of refusing to start.
    let analytics = match &config.database_url {
        Some(url) => match setup_database(url).await {
            Ok(pool) => {
                log::info!("✅ PostgreSQL connected (analytics)");
                AnalyticsSink::new(pool)
            }
            Err(e) => {
                log::warn!("⚠️  Analytics database unavailable: {}", e);
                AnalyticsSink::disabled()
            }
        },
        None => {
            log::warn!("⚠️  DATABASE_URL not set, analytics disabled");
            AnalyticsSink::disabled()
        }
    };

    let upstream = UpstreamClient::new(&config.ai);

    let state = Arc::new(AppState {
        upstream,
        analytics,
        config: config.ai.clone(),
    });

    Ok((config, state))
}

// ============================================================================
// Setup Functions
// ============================================================================

async fn setup_database(url: &str) -> std::result::Result<sqlx::PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(5).connect(url).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_missing_api_key_is_a_configuration_error() {
        // Serialized via the env var name: nothing else in the suite sets it.
        unsafe { std::env::remove_var("AI_GATEWAY_API_KEY") };
        let err = AiConfig::from_env().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.message.contains("AI_GATEWAY_API_KEY"));
    }
}
