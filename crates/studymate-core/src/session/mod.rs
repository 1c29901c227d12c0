//! Session Initializer: the agent process's orchestration of one room.
//!
//! ```text
//! CONNECTING → LOADING_MEMORY → STARTING_SUBSESSIONS → READY | DEGRADED | FAILED
//!            → ACTIVE → FINALIZING → TERMINATED
//! ```
//!
//! The avatar and conversation sub-sessions start concurrently and both
//! outcomes are awaited. Only the conversation is required; a failed avatar
//! degrades the session to audio-only.

mod monitor;
pub mod prompts;

pub use monitor::{Departure, spawn_participant_logger};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use studymate_traits::{
    AvatarHandle, AvatarService, ConversationConfig, ConversationService, ConversationSession,
    Room, RoomConnector, ServiceError, TextGenerator,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::capture::{CaptureOutcome, ConversationCapture, MarkerVerbosity, TranscriptBuffer};
use crate::config::normalize_language;
use crate::memory::{DEFAULT_CONTEXT_LIMIT, MemoryClient, format_for_context};
use monitor::DepartureWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Connecting,
    LoadingMemory,
    StartingSubsessions,
    Ready,
    Degraded,
    Failed,
    Active,
    Finalizing,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Terminated)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to room {room}: {source}")]
    Connect {
        room: String,
        #[source]
        source: ServiceError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingOutcome {
    Generated,
    Fallback,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub room_name: String,
    pub language: String,
    /// Memory key; memory and capture are skipped without one.
    pub display_name: Option<String>,
    pub persona: String,
    pub voice: String,
    pub temperature: f32,
    pub memory_limit: usize,
    pub participant_log_interval: Duration,
    /// Upper bound on waiting for the summary write before exiting.
    pub finalize_timeout: Duration,
    pub marker_verbosity: MarkerVerbosity,
}

impl SessionSettings {
    pub fn new(room_name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            room_name: room_name.into(),
            language: language.into(),
            display_name: None,
            persona: prompts::PERSONA.to_string(),
            voice: prompts::REALTIME_VOICE.to_string(),
            temperature: prompts::REALTIME_TEMPERATURE,
            memory_limit: DEFAULT_CONTEXT_LIMIT,
            participant_log_interval: Duration::from_secs(10),
            finalize_timeout: Duration::from_secs(30),
            marker_verbosity: MarkerVerbosity::default(),
        }
    }

    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name.filter(|name| !name.trim().is_empty());
        self
    }
}

/// What happened over one session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub states: Vec<SessionState>,
    pub memory_entries: usize,
    pub avatar_started: bool,
    pub greeting: Option<GreetingOutcome>,
    pub departure: Option<Departure>,
    pub capture: Option<CaptureOutcome>,
}

impl SessionReport {
    pub fn final_state(&self) -> Option<SessionState> {
        self.states.last().copied()
    }

    pub fn reached(&self, state: SessionState) -> bool {
        self.states.contains(&state)
    }
}

pub struct SessionInitializer {
    settings: SessionSettings,
    connector: Arc<dyn RoomConnector>,
    conversation: Arc<dyn ConversationService>,
    avatar: Option<Arc<dyn AvatarService>>,
    memory: Option<MemoryClient>,
    summarizer: Option<Arc<dyn TextGenerator>>,
    state_tx: watch::Sender<SessionState>,
    history: Mutex<Vec<SessionState>>,
}

impl SessionInitializer {
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn RoomConnector>,
        conversation: Arc<dyn ConversationService>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        Self {
            settings,
            connector,
            conversation,
            avatar: None,
            memory: None,
            summarizer: None,
            state_tx,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_avatar(mut self, avatar: Arc<dyn AvatarService>) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn with_memory(mut self, memory: MemoryClient) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn TextGenerator>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        info!(room = %self.settings.room_name, state = ?state, "Session state");
        self.history.lock().push(state);
        self.state_tx.send_replace(state);
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            states: self.history.lock().clone(),
            memory_entries: 0,
            avatar_started: false,
            greeting: None,
            departure: None,
            capture: None,
        }
    }

    /// Run the session until the user leaves.
    ///
    /// Only a failed room connection is an error. A failed conversation
    /// start ends the session in `FAILED` and is reported, not raised.
    pub async fn run(&self) -> Result<SessionReport, SessionError> {
        let room_name = self.settings.room_name.clone();
        self.set_state(SessionState::Connecting);
        let room = match self.connector.connect(&room_name).await {
            Ok(room) => room,
            Err(source) => {
                error!(room = %room_name, error = %source, "Room connection failed");
                self.set_state(SessionState::Failed);
                return Err(SessionError::Connect {
                    room: room_name,
                    source,
                });
            }
        };
        info!(room = %room_name, "Connected to room");

        self.set_state(SessionState::LoadingMemory);
        let (memory_context, memory_entries) = self.load_memory_context().await;

        self.set_state(SessionState::StartingSubsessions);
        let buffer = Arc::new(TranscriptBuffer::new());
        let (avatar, conversation) = tokio::join!(
            self.start_avatar(room.as_ref()),
            self.start_conversation(&memory_context, buffer.clone()),
        );

        let Some(conversation) = conversation else {
            error!(room = %room_name, "Conversation failed to start, ending session");
            self.set_state(SessionState::Failed);
            self.stop_avatar(avatar.as_ref()).await;
            room.disconnect().await;
            let mut report = self.report();
            report.memory_entries = memory_entries;
            report.avatar_started = avatar.is_some();
            return Ok(report);
        };
        self.set_state(if avatar.is_some() {
            SessionState::Ready
        } else {
            SessionState::Degraded
        });

        // Subscribe before greeting so no departure is missed.
        let mut events = room.subscribe();
        let initial = room.participants().await.unwrap_or_else(|err| {
            warn!(room = %room_name, error = %err, "Failed to snapshot participants");
            Vec::new()
        });
        let mut watcher = DepartureWatcher::new(
            avatar.as_ref().map(|handle| handle.participant_identity.clone()),
            &initial,
        );

        self.set_state(SessionState::Active);
        let greeting = self
            .greet(conversation.as_ref(), !memory_context.is_empty())
            .await;
        let logger = spawn_participant_logger(room.clone(), self.settings.participant_log_interval);
        info!(
            room = %room_name,
            participants = initial.len(),
            "Session active, waiting for participants to leave"
        );

        let departure = watcher.wait(&mut events).await;
        info!(room = %room_name, departure = ?departure, "Session ending");
        logger.abort();

        self.set_state(SessionState::Finalizing);
        let capture = self.finalize(buffer).await;

        if let Err(err) = conversation.close().await {
            warn!(room = %room_name, error = %err, "Failed to close conversation");
        }
        self.stop_avatar(avatar.as_ref()).await;
        room.disconnect().await;
        self.set_state(SessionState::Terminated);

        let mut report = self.report();
        report.memory_entries = memory_entries;
        report.avatar_started = avatar.is_some();
        report.greeting = Some(greeting);
        report.departure = Some(departure);
        report.capture = capture;
        Ok(report)
    }

    /// Formatted context and the number of entries behind it. Failures
    /// leave the context empty.
    async fn load_memory_context(&self) -> (String, usize) {
        let (Some(memory), Some(user)) = (&self.memory, &self.settings.display_name) else {
            info!("No memory key for this session");
            return (String::new(), 0);
        };
        let entries = memory.get_recent(user, self.settings.memory_limit).await;
        info!(user = %user, count = entries.len(), "Loaded memory context");
        (format_for_context(&entries), entries.len())
    }

    async fn start_avatar(&self, room: &dyn Room) -> Option<AvatarHandle> {
        let Some(avatar) = &self.avatar else {
            warn!("Avatar service not configured, continuing audio-only");
            return None;
        };
        match avatar.start(room).await {
            Ok(handle) => {
                info!(identity = %handle.participant_identity, "Avatar started");
                Some(handle)
            }
            Err(err) => {
                error!(error = %err, "Avatar failed to start, continuing audio-only");
                None
            }
        }
    }

    async fn stop_avatar(&self, handle: Option<&AvatarHandle>) {
        if let (Some(avatar), Some(handle)) = (&self.avatar, handle)
            && let Err(err) = avatar.stop(handle).await
        {
            warn!(session = %handle.session_id, error = %err, "Failed to stop avatar");
        }
    }

    async fn start_conversation(
        &self,
        memory_context: &str,
        buffer: Arc<TranscriptBuffer>,
    ) -> Option<Arc<dyn ConversationSession>> {
        let config = ConversationConfig {
            room_name: self.settings.room_name.clone(),
            instructions: prompts::session_instructions(
                &self.settings.persona,
                self.settings.display_name.as_deref(),
                memory_context,
            ),
            language: normalize_language(&self.settings.language).to_string(),
            voice: self.settings.voice.clone(),
            temperature: self.settings.temperature,
        };
        match self.conversation.start(config, buffer).await {
            Ok(session) => {
                info!("Conversation session started");
                Some(session)
            }
            Err(err) => {
                error!(error = %err, "Conversation session failed to start");
                None
            }
        }
    }

    async fn greet(
        &self,
        conversation: &dyn ConversationSession,
        has_memory: bool,
    ) -> GreetingOutcome {
        let instructions =
            prompts::greeting_instructions(self.settings.display_name.as_deref(), has_memory);
        match conversation.generate_reply(&instructions).await {
            Ok(()) => {
                info!("Initial greeting sent");
                return GreetingOutcome::Generated;
            }
            Err(err) => warn!(error = %err, "Greeting failed, trying scripted greeting"),
        }
        match conversation.say(prompts::FALLBACK_GREETING).await {
            Ok(()) => {
                info!("Fallback greeting sent");
                GreetingOutcome::Fallback
            }
            Err(err) => {
                error!(error = %err, "Fallback greeting failed");
                GreetingOutcome::Failed
            }
        }
    }

    /// Run capture on its own task and wait for it, bounded.
    async fn finalize(&self, buffer: Arc<TranscriptBuffer>) -> Option<CaptureOutcome> {
        let (Some(memory), Some(user)) = (&self.memory, &self.settings.display_name) else {
            info!(fragments = buffer.len(), "No memory key, skipping capture");
            return None;
        };
        let mut capture = ConversationCapture::new(buffer, memory.clone(), user.clone())
            .with_verbosity(self.settings.marker_verbosity);
        if let Some(summarizer) = &self.summarizer {
            capture = capture.with_summarizer(summarizer.clone());
        }

        let task = tokio::spawn(async move { capture.finalize().await });
        match tokio::time::timeout(self.settings.finalize_timeout, task).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => {
                error!(error = %err, "Capture task failed");
                None
            }
            Err(_) => {
                warn!("Capture did not finish in time");
                None
            }
        }
    }
}
