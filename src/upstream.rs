use reqwest::StatusCode;

use crate::error::{AppError, Result};
use crate::init::AiConfig;
use crate::models::{ChatRequest, ChatTurn, CompletionResponse, Usage};

// ============================================================================
// Upstream AI Gateway Client
// ============================================================================

/// Client for the AI gateway's chat-completion endpoint. One outbound
/// connection per inbound request; no pooling beyond reqwest's own.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
}

impl UpstreamClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Open a streaming completion. The caller's message sequence passes
    /// through unmodified; only the model default is injected when omitted.
    /// Returns the raw response so its bytes can be relayed verbatim.
    pub async fn open_chat_stream(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.chat_model.clone());

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": model,
                "messages": request.messages,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("AI gateway unreachable: {}", e)))?;

        Self::check_status(response).await
    }

    /// Blocking (non-streaming) completion for the recommendations path.
    pub async fn complete(
        &self,
        messages: &[ChatTurn],
        temperature: f32,
    ) -> Result<(String, Option<Usage>)> {
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.chat_model,
                "messages": messages,
                "temperature": temperature,
            }))
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("AI gateway unreachable: {}", e)))?;

        let response = Self::check_status(response).await?;
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("Invalid AI gateway reply: {}", e)))?;

        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::upstream("AI gateway reply contained no choices"))?;

        Ok((content, completion.usage))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::error!("AI gateway error: {} {}", status, body);

        // 402 is the gateway's quota-exhaustion status; both map to the
        // caller-retryable rate-limit kind.
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
            Err(AppError::rate_limited(
                extract_upstream_message(&body)
                    .unwrap_or_else(|| "Rate limit exceeded, please try again later".to_string()),
            ))
        } else {
            Err(AppError::upstream(
                extract_upstream_message(&body)
                    .unwrap_or_else(|| format!("AI gateway error: {}", status.as_u16())),
            ))
        }
    }
}

/// Pull a human-readable message out of an upstream error body, which is
/// either `{"error": {"message": "..."}}` or `{"error": "..."}`.
fn extract_upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::MessageRole;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AiConfig {
        AiConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            chat_model: "google/gemini-2.5-flash".to_string(),
        }
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatTurn::user("hi")],
            model: None,
        }
    }

    #[tokio::test]
    async fn test_stream_request_injects_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "google/gemini-2.5-flash",
                "stream": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server));
        let response = client.open_chat_stream(&chat_request()).await.unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_caller_model_overrides_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "google/gemini-2.5-pro"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server));
        let mut request = chat_request();
        request.model = Some("google/gemini-2.5-pro".to_string());
        client.open_chat_stream(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit exceeded"}
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server));
        let err = client.open_chat_stream(&chat_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.message, "Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_quota_exhaustion_also_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(402).set_body_string("Payment Required"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server));
        let err = client.open_chat_stream(&chat_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        // Unparseable body falls back to the default message.
        assert!(err.message.contains("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_other_upstream_failures_map_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": "model overloaded"
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server));
        let err = client.open_chat_stream(&chat_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamError);
        assert_eq!(err.message, "model overloaded");
    }

    #[tokio::test]
    async fn test_complete_returns_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "[\"Drink more water\"]"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server));
        let messages = vec![ChatTurn::system("coach"), ChatTurn::user("help")];
        let (content, usage) = client.complete(&messages, 0.8).await.unwrap();

        assert_eq!(content, "[\"Drink more water\"]");
        let usage = usage.unwrap();
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(messages[0].role, MessageRole::System);
    }

    #[test]
    fn test_extract_upstream_message_shapes() {
        assert_eq!(
            extract_upstream_message(r#"{"error":{"message":"nested"}}"#).as_deref(),
            Some("nested")
        );
        assert_eq!(
            extract_upstream_message(r#"{"error":"flat"}"#).as_deref(),
            Some("flat")
        );
        assert_eq!(extract_upstream_message("not json"), None);
        assert_eq!(extract_upstream_message(r#"{"error":{"code":500}}"#), None);
    }
}
