use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AppError, ErrorKind, Result};
use crate::init::AppState;
use crate::models::{
    AiRequestLog, ChatRequest, ChatTurn, HealthStatus, RecommendationRequest,
    RecommendationsResponse,
};

const RECOMMENDATION_PROMPT: &str = "You are an expert health coach. Provide personalized, \
    actionable diet and fitness recommendations based on user data. Be encouraging and \
    specific. Return 3-5 recommendations as a JSON array of strings.";

// ============================================================================
// Middleware
// ============================================================================

/// The session provider owns token validation; the relay only refuses
/// requests that carry no bearer credential at all.
pub async fn auth_middleware(request: Request, next: Next) -> Result<Response> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| !token.trim().is_empty());

    if !authorized {
        return Err(AppError::unauthorized("Missing authorization header"));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// STREAMING CHAT RELAY
// ============================================================================

/// Relay for streaming chat completions.
///
/// POST /api/coach/chat
/// Body: ChatRequest JSON
///
/// Returns: 200 with the upstream byte stream passed through verbatim, or a
/// structured error body with status 429/500.
pub async fn chat_relay_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    if request.messages.is_empty() {
        return Err(AppError::bad_request("messages must not be empty"));
    }

    let model = request
        .model
        .clone()
        .unwrap_or_else(|| state.config.chat_model.clone());
    let started = Instant::now();

    let upstream = match state.upstream.open_chat_stream(&request).await {
        Ok(upstream) => upstream,
        Err(e) => {
            state
                .analytics
                .record(AiRequestLog::chat(&model).with_latency(started.elapsed()).failed(&e.message));
            return Err(e);
        }
    };

    // Token counts are unknowable here: the stream flows through untouched.
    state
        .analytics
        .record(AiRequestLog::chat(&model).with_latency(started.elapsed()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::internal(format!("failed to build stream response: {}", e)))
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

/// One-shot recommendation generation.
///
/// POST /api/coach/recommendations
/// Body: RecommendationRequest JSON (health snapshot)
///
/// Returns: 3-5 recommendation strings. When the gateway is rate limited
/// the static fallback set is served with a 200 so the dashboard still
/// renders.
pub async fn recommendations_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendationRequest>,
) -> Result<Json<RecommendationsResponse>> {
    let started = Instant::now();

    let context = serde_json::to_string_pretty(&request.context)
        .map_err(|e| AppError::internal(format!("failed to encode context: {}", e)))?;
    let messages = vec![
        ChatTurn::system(RECOMMENDATION_PROMPT),
        ChatTurn::user(format!(
            "Based on this health data, provide personalized recommendations:\n{}",
            context
        )),
    ];

    match state.upstream.complete(&messages, 0.8).await {
        Ok((content, usage)) => {
            state.analytics.record(
                AiRequestLog::recommendation(&state.config.chat_model)
                    .with_latency(started.elapsed())
                    .with_usage(usage.as_ref()),
            );
            Ok(Json(RecommendationsResponse {
                recommendations: parse_recommendations(&content),
            }))
        }
        Err(e) if e.kind == ErrorKind::RateLimited => {
            log::warn!("recommendations rate limited, serving fallback set");
            Ok(Json(RecommendationsResponse {
                recommendations: rate_limit_fallback(),
            }))
        }
        Err(e) => {
            state.analytics.record(
                AiRequestLog::recommendation(&state.config.chat_model)
                    .with_latency(started.elapsed())
                    .failed(&e.message),
            );
            Err(e)
        }
    }
}

/// The model is asked for a JSON array but tends to wrap it in prose; take
/// the outermost bracketed slice first, then the raw content, then give up
/// and serve the parse fallback.
fn parse_recommendations(content: &str) -> Vec<String> {
    let bracketed = content.find('[').and_then(|start| {
        content
            .rfind(']')
            .filter(|&end| end > start)
            .map(|end| &content[start..=end])
    });

    bracketed
        .and_then(|slice| serde_json::from_str::<Vec<String>>(slice).ok())
        .or_else(|| serde_json::from_str::<Vec<String>>(content).ok())
        .unwrap_or_else(|| {
            log::warn!("recommendation reply was not a JSON array, serving fallback set");
            parse_fallback()
        })
}

fn rate_limit_fallback() -> Vec<String> {
    vec![
        "Keep tracking your meals consistently".to_string(),
        "Aim for balanced macros in each meal".to_string(),
        "Stay hydrated with 8 glasses of water daily".to_string(),
    ]
}

fn parse_fallback() -> Vec<String> {
    vec![
        "Continue tracking your meals for better insights".to_string(),
        "Focus on whole foods and lean proteins".to_string(),
        "Stay consistent with your water intake".to_string(),
    ]
}

// ============================================================================
// HEALTH
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus::healthy(state.analytics.is_enabled()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recommendations_plain_array() {
        let recs = parse_recommendations(r#"["Eat greens","Walk daily"]"#);
        assert_eq!(recs, vec!["Eat greens", "Walk daily"]);
    }

    #[test]
    fn test_parse_recommendations_array_wrapped_in_prose() {
        let content = "Here are your tips:\n[\"Eat greens\",\"Walk daily\"]\nGood luck!";
        let recs = parse_recommendations(content);
        assert_eq!(recs, vec!["Eat greens", "Walk daily"]);
    }

    #[test]
    fn test_parse_recommendations_falls_back_on_prose() {
        let recs = parse_recommendations("I cannot produce a list right now.");
        assert_eq!(recs, parse_fallback());
    }

    #[test]
    fn test_fallback_sets_are_distinct() {
        assert_ne!(rate_limit_fallback(), parse_fallback());
    }
}
