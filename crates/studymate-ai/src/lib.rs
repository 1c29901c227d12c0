//! StudyMate AI - model provider clients.
//!
//! - [`llm::GeminiClient`] implements `TextGenerator` over the Gemini REST API
//! - [`realtime::GeminiLiveService`] implements `ConversationService` over the
//!   Gemini Live websocket, reporting transcripts through `TranscriptObserver`
//! - [`llm::MockTextGenerator`] is a scripted generator for tests

pub mod error;
mod http_client;
pub mod llm;
pub mod realtime;

pub use error::{AiError, Result};
pub use llm::{GeminiClient, MockStep, MockTextGenerator, RetryConfig};
pub use realtime::{GeminiLiveConfig, GeminiLiveService, GeminiLiveSession};
