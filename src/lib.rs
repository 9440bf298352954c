pub mod analytics;
pub mod chat;
pub mod error;

pub mod handlers;
pub mod init;
pub mod models;
pub mod upstream;

pub use crate::chat::{CancellationToken, ChatSession, FrameDecoder, TurnState};
pub use crate::init::{AiConfig, AppState, Config};
pub use crate::upstream::UpstreamClient;
