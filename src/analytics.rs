use chrono::Utc;
use sqlx::PgPool;

use crate::models::AiRequestLog;

// ============================================================================
// Analytics Sink
// ============================================================================

/// Best-effort recorder for `ai_request_logs`. Recording happens on a
/// detached task; failures are warned and swallowed so they can never
/// affect the chat response. Without a database the sink is a no-op.
#[derive(Clone)]
pub struct AnalyticsSink {
    pool: Option<PgPool>,
}

impl AnalyticsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn disabled() -> Self {
        Self { pool: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Fire-and-forget: returns immediately, the insert runs detached.
    pub fn record(&self, log: AiRequestLog) {
        let Some(pool) = self.pool.clone() else {
            log::debug!(
                "analytics disabled, dropping {} log",
                log.request_type.as_str()
            );
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = insert_log(&pool, &log).await {
                log::warn!("Failed to log AI request: {}", e);
            }
        });
    }
}

async fn insert_log(pool: &PgPool, log: &AiRequestLog) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ai_request_logs
            (request_type, model_used, input_tokens, output_tokens, total_tokens,
             response_time_ms, status, error_message, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(log.request_type.as_str())
    .bind(&log.model_used)
    .bind(log.input_tokens)
    .bind(log.output_tokens)
    .bind(log.total_tokens)
    .bind(log.response_time_ms)
    .bind(&log.status)
    .bind(log.error_message.as_deref())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
