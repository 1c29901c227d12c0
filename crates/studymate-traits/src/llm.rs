//! One-shot text generation.

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation capability used for summaries and ice-breakers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
