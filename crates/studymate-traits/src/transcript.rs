//! Structured transcript events emitted by the speech pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    User,
    Assistant,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of recognized (or synthesized) speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub role: SpeakerRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl TranscriptFragment {
    pub fn new(role: SpeakerRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Subscriber for transcript fragments.
///
/// Called from the speech pipeline's receive loop, so implementations must
/// not block.
pub trait TranscriptObserver: Send + Sync {
    fn on_fragment(&self, fragment: TranscriptFragment);
}
