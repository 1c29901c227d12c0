//! Conversation Capture & Summarizer.
//!
//! A [`TranscriptBuffer`] is created per session and handed to the
//! conversation service as its transcript observer. When the user leaves,
//! [`ConversationCapture::finalize`] turns the buffer into one memory entry:
//! a summary when there is a transcript, a session marker otherwise.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use studymate_traits::{
    MemoryKind, SpeakerRole, TextGenerator, TranscriptFragment, TranscriptObserver,
};
use tracing::{debug, info, warn};

use crate::memory::MemoryClient;

/// How much the fallback session marker carries when no summary is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerVerbosity {
    /// Timestamp only.
    Minimal,
    /// Timestamp plus the last captured utterance, if any.
    #[default]
    WithLastUtterance,
}

impl FromStr for MarkerVerbosity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "minimal" => Ok(Self::Minimal),
            "with_last_utterance" => Ok(Self::WithLastUtterance),
            other => Err(format!("unknown marker verbosity: {other}")),
        }
    }
}

/// Append-only transcript for one session.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    fragments: Mutex<Vec<TranscriptFragment>>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, fragment: TranscriptFragment) {
        let text = fragment.text.trim();
        if text.is_empty() {
            return;
        }
        let fragment = TranscriptFragment {
            text: text.to_string(),
            ..fragment
        };
        self.fragments.lock().push(fragment);
    }

    pub fn len(&self) -> usize {
        self.fragments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TranscriptFragment> {
        self.fragments.lock().clone()
    }

    pub fn last_utterance(&self) -> Option<String> {
        self.fragments
            .lock()
            .last()
            .map(|fragment| fragment.text.clone())
    }

    /// Consume the transcript, leaving the buffer empty.
    pub fn take(&self) -> Vec<TranscriptFragment> {
        std::mem::take(&mut *self.fragments.lock())
    }
}

impl TranscriptObserver for TranscriptBuffer {
    fn on_fragment(&self, fragment: TranscriptFragment) {
        debug!(role = %fragment.role, chars = fragment.text.len(), "Transcript fragment");
        self.push(fragment);
    }
}

/// `Role: text` lines in arrival order.
pub fn render_transcript(fragments: &[TranscriptFragment]) -> String {
    fragments
        .iter()
        .map(|fragment| {
            let speaker = match fragment.role {
                SpeakerRole::User => "Student",
                SpeakerRole::Assistant => "StudyMate",
            };
            format!("{speaker}: {}", fragment.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_prompt(transcript: &str) -> String {
    format!(
        "Summarize this study session between a student and their AI study partner \
in at most four sentences. Mention the topics covered, any concerns the student raised, \
the progress they made and any agreed next steps. Write in the third person about the \
student and return only the summary.\n\nConversation:\n{transcript}"
    )
}

pub fn session_marker(
    at: DateTime<Utc>,
    last_utterance: Option<&str>,
    verbosity: MarkerVerbosity,
) -> String {
    let mut marker = format!(
        "Had a study session with StudyMate on {}.",
        at.format("%Y-%m-%d %H:%M UTC")
    );
    if verbosity == MarkerVerbosity::WithLastUtterance
        && let Some(utterance) = last_utterance
    {
        marker.push_str(&format!(" Last thing said: \"{utterance}\""));
    }
    marker
}

/// What finalize wrote, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Summary { stored: bool },
    Marker { stored: bool },
    AlreadyFinalized,
}

impl CaptureOutcome {
    pub fn stored(&self) -> bool {
        matches!(
            self,
            Self::Summary { stored: true } | Self::Marker { stored: true }
        )
    }
}

pub struct ConversationCapture {
    buffer: Arc<TranscriptBuffer>,
    memory: MemoryClient,
    summarizer: Option<Arc<dyn TextGenerator>>,
    user_key: String,
    verbosity: MarkerVerbosity,
    finalized: AtomicBool,
}

impl ConversationCapture {
    pub fn new(
        buffer: Arc<TranscriptBuffer>,
        memory: MemoryClient,
        user_key: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            memory,
            summarizer: None,
            user_key: user_key.into(),
            verbosity: MarkerVerbosity::default(),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn TextGenerator>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_verbosity(mut self, verbosity: MarkerVerbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Summarize and store the session. Runs at most once; never fails.
    pub async fn finalize(&self) -> CaptureOutcome {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return CaptureOutcome::AlreadyFinalized;
        }

        let last_utterance = self.buffer.last_utterance();
        let fragments = self.buffer.take();
        if fragments.is_empty() {
            info!(user = %self.user_key, "No transcript captured, storing session marker");
            return self.store_marker(last_utterance.as_deref()).await;
        }

        let transcript = render_transcript(&fragments);
        match self.summarize(&transcript).await {
            Some(summary) => {
                let stored = self
                    .memory
                    .add_tagged(&self.user_key, &summary, "assistant", MemoryKind::SessionSummary)
                    .await;
                info!(
                    user = %self.user_key,
                    fragments = fragments.len(),
                    stored,
                    "Session summary finalized"
                );
                CaptureOutcome::Summary { stored }
            }
            None => self.store_marker(last_utterance.as_deref()).await,
        }
    }

    async fn summarize(&self, transcript: &str) -> Option<String> {
        let Some(summarizer) = &self.summarizer else {
            debug!("No summarizer configured");
            return None;
        };
        match summarizer.generate(&summary_prompt(transcript)).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
            Ok(_) => {
                warn!(
                    user = %self.user_key,
                    model = summarizer.model(),
                    "Summarizer returned empty text"
                );
                None
            }
            Err(err) => {
                warn!(
                    user = %self.user_key,
                    model = summarizer.model(),
                    error = %err,
                    "Summarization failed"
                );
                None
            }
        }
    }

    async fn store_marker(&self, last_utterance: Option<&str>) -> CaptureOutcome {
        let marker = session_marker(Utc::now(), last_utterance, self.verbosity);
        let stored = self
            .memory
            .add_tagged(&self.user_key, &marker, "assistant", MemoryKind::SessionMarker)
            .await;
        CaptureOutcome::Marker { stored }
    }
}
