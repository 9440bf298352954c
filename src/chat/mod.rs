// Public module exports
pub mod decoder;
pub mod reducer;
pub mod session;

// Re-export main types for convenience
pub use decoder::{DecodeError, FrameDecoder};
pub use session::{CancellationToken, ChatSession, TurnState, delta_stream};
