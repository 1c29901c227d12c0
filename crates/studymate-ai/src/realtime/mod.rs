//! Realtime voice sessions.

mod gemini_live;
mod protocol;

pub use gemini_live::{GeminiLiveConfig, GeminiLiveService, GeminiLiveSession};
