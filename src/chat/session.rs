use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chat::decoder::FrameDecoder;
use crate::chat::reducer;
use crate::error::{AppError, ErrorBody, Result};
use crate::models::{ChatMessage, ChatRequest, ChatTurn};

const GREETING: &str =
    "Hello! I'm your AI Health Coach. How can I help you with your health goals today?";

// ============================================================================
// Turn State
// ============================================================================

/// Lifecycle of one streaming call. `Terminated` and `Aborted` are terminal;
/// a new turn starts over from the beginning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingFirstByte,
    Streaming,
    Terminated,
    Aborted,
}

// ============================================================================
// Cancellation Token
// ============================================================================

#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<RwLock<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn cancel(&self) {
        let mut cancelled = self.cancelled.write().await;
        *cancelled = true;
    }

    pub async fn is_cancelled(&self) -> bool {
        *self.cancelled.read().await
    }
}

// ============================================================================
// Delta Stream
// ============================================================================

/// Turn a raw byte stream into a lazy sequence of content deltas.
///
/// Reads are serialized by single ownership of the byte stream. Once the
/// token is cancelled no further reads are issued and the stream ends. The
/// stream also ends on the `[DONE]` sentinel or when the bytes run out.
pub fn delta_stream<S, E>(
    bytes: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut bytes = Box::pin(bytes);

        loop {
            if cancel.is_cancelled().await {
                break;
            }
            let Some(chunk) = bytes.next().await else {
                break;
            };
            match chunk {
                Ok(chunk) => {
                    match decoder.feed(&chunk) {
                        Ok(deltas) => {
                            for delta in deltas {
                                yield Ok(delta);
                            }
                        }
                        Err(e) => {
                            yield Err(AppError::stream_read(e.to_string()));
                            break;
                        }
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Err(e) => {
                    yield Err(AppError::stream_read(format!("stream read failed: {}", e)));
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Chat Session
// ============================================================================

/// Client-side conversation against the relay. Owns its message history and
/// buffer; nothing is shared between sessions.
pub struct ChatSession {
    http: reqwest::Client,
    relay_url: String,
    bearer_token: String,
    messages: Vec<ChatMessage>,
    state: TurnState,
}

impl ChatSession {
    pub fn new(relay_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url: relay_url.into(),
            bearer_token: bearer_token.into(),
            messages: vec![ChatMessage::assistant(GREETING)],
            state: TurnState::Idle,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Re-entrancy guard: the send action is disabled while a turn streams.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self.state,
            TurnState::AwaitingFirstByte | TurnState::Streaming
        )
    }

    /// Send one user message and stream the assistant reply to completion.
    ///
    /// On success the accumulated reply is the last message. On failure the
    /// turn is rolled back: a partially filled placeholder is discarded and
    /// the error is returned for the caller to surface. Cancelling the token
    /// stops further reads; deltas already applied remain.
    pub async fn send(&mut self, text: &str, cancel: &CancellationToken) -> Result<()> {
        if self.is_streaming() {
            return Err(AppError::bad_request("a chat turn is already in flight"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::bad_request("message is empty"));
        }

        self.messages.push(ChatMessage::user(text));
        self.state = TurnState::AwaitingFirstByte;

        let request = ChatRequest {
            messages: self.messages.iter().map(ChatTurn::from).collect(),
            model: None,
        };

        let response = match self
            .http
            .post(&self.relay_url)
            .bearer_auth(&self.bearer_token)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.messages.pop();
                self.state = TurnState::Aborted;
                return Err(AppError::stream_read(format!("chat request failed: {}", e)));
            }
        };

        if !response.status().is_success() {
            self.messages.pop();
            self.state = TurnState::Aborted;
            return Err(relay_error(response).await);
        }

        self.state = TurnState::Streaming;
        self.messages = reducer::begin_assistant_turn(&self.messages);

        let stream = delta_stream(response.bytes_stream(), cancel.clone());
        futures::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    self.messages = reducer::apply_delta(&self.messages, &delta);
                }
                Err(e) => {
                    self.messages = reducer::discard_placeholder(&self.messages);
                    self.state = TurnState::Aborted;
                    return Err(e);
                }
            }
        }

        self.state = if cancel.is_cancelled().await {
            TurnState::Aborted
        } else {
            TurnState::Terminated
        };
        Ok(())
    }
}

/// Map a non-success relay response to the error the UI shows. The relay's
/// structured body is preferred; a default message covers anything else.
async fn relay_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| "Failed to get response".to_string());

    match status.as_u16() {
        401 => AppError::unauthorized(message),
        429 => AppError::rate_limited(message),
        _ => AppError::upstream(message),
    }
}

// ============================================================================
// Tests
// ============================================================================
