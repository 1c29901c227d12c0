//! Conversational AI sub-session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::transcript::TranscriptObserver;

/// Launch parameters for a conversational session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub room_name: String,
    /// Persona plus any injected memory context.
    pub instructions: String,
    pub language: String,
    pub voice: String,
    pub temperature: f32,
}

#[async_trait]
pub trait ConversationSession: Send + Sync {
    /// Ask the model to produce a reply guided by `instructions`.
    async fn generate_reply(&self, instructions: &str) -> Result<()>;

    /// Speak `text` verbatim.
    async fn say(&self, text: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Start a session. Transcript fragments are delivered to `observer` for
    /// the lifetime of the session.
    async fn start(
        &self,
        config: ConversationConfig,
        observer: Arc<dyn TranscriptObserver>,
    ) -> Result<Arc<dyn ConversationSession>>;
}
