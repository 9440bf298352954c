use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Conversation Model
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in a conversation. The last element of a conversation may
/// still be growing while a turn streams; `content` only ever grows by
/// appending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message appended before a streaming turn begins.
    pub fn assistant_placeholder() -> Self {
        Self::assistant("")
    }
}

// ============================================================================
// Relay Request / Wire Types
// ============================================================================

/// One `{role, content}` pair as sent over the wire, both inbound to the
/// relay and outbound to the AI gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for ChatTurn {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Inbound body of `POST /api/coach/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Non-streaming completion reply from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

// ============================================================================
// Recommendations
// ============================================================================

/// Client-supplied health snapshot the recommendation prompt is built from.
/// The caller assembles it from its own profile/activity/meal records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<String>,
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Chat,
    Recommendation,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Recommendation => "recommendation",
        }
    }
}

/// One row for the `ai_request_logs` table. Recording is best-effort and
/// never part of the request's success/failure contract.
#[derive(Debug, Clone)]
pub struct AiRequestLog {
    pub request_type: RequestType,
    pub model_used: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub response_time_ms: i64,
    pub status: String,
    pub error_message: Option<String>,
}

impl AiRequestLog {
    pub fn new(request_type: RequestType, model: impl Into<String>) -> Self {
        Self {
            request_type,
            model_used: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            response_time_ms: 0,
            status: "success".to_string(),
            error_message: None,
        }
    }

    pub fn chat(model: impl Into<String>) -> Self {
        Self::new(RequestType::Chat, model)
    }

    pub fn recommendation(model: impl Into<String>) -> Self {
        Self::new(RequestType::Recommendation, model)
    }

    pub fn with_latency(mut self, elapsed: std::time::Duration) -> Self {
        self.response_time_ms = elapsed.as_millis() as i64;
        self
    }

    pub fn with_usage(mut self, usage: Option<&Usage>) -> Self {
        if let Some(usage) = usage {
            self.input_tokens = usage.prompt_tokens;
            self.output_tokens = usage.completion_tokens;
            self.total_tokens = usage.total_tokens;
        }
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = "error".to_string();
        self.error_message = Some(message.into());
        self
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub gateway: bool,
    pub analytics: bool,
}

impl HealthStatus {
    pub fn healthy(analytics: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                gateway: true,
                analytics,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        let turn = ChatTurn::user("hi");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let parsed: ChatTurn = serde_json::from_str(r#"{"role":"assistant","content":"hello"}"#).unwrap();
        assert_eq!(parsed.role, MessageRole::Assistant);
    }

    #[test]
    fn test_chat_request_accepts_missing_model() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert!(request.model.is_none());
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_placeholder_is_empty_assistant() {
        let placeholder = ChatMessage::assistant_placeholder();
        assert_eq!(placeholder.role, MessageRole::Assistant);
        assert!(placeholder.content.is_empty());
    }

    #[test]
    fn test_completion_response_tolerates_missing_usage() {
        let json = r#"{"choices":[{"message":{"content":"ok"}}]}"#;
        let response: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content, "ok");
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_request_log_defaults() {
        let log = AiRequestLog::chat("google/gemini-2.5-flash");
        assert_eq!(log.status, "success");
        assert_eq!(log.total_tokens, 0);
        assert!(log.error_message.is_none());

        let failed = log.failed("boom");
        assert_eq!(failed.status, "error");
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_request_log_usage() {
        let usage = Usage {
            prompt_tokens: 12,
            completion_tokens: 34,
            total_tokens: 46,
        };
        let log = AiRequestLog::recommendation("google/gemini-2.5-flash").with_usage(Some(&usage));
        assert_eq!(log.input_tokens, 12);
        assert_eq!(log.output_tokens, 34);
        assert_eq!(log.total_tokens, 46);
    }
}
