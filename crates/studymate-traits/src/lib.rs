//! StudyMate Traits - Shared trait definitions and core types.
//!
//! Every remote capability the agent and the HTTP façade rely on is reached
//! through a trait defined here:
//! - `MemoryBackend` for the key-scoped memory store
//! - `TextGenerator` for one-shot text generation
//! - `RoomConnector` / `Room` for the real-time media room
//! - `AvatarService` for the avatar rendering sub-session
//! - `ConversationService` / `ConversationSession` for the conversational sub-session
//! - `TranscriptObserver` for structured transcript fragments

pub mod avatar;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod memory;
pub mod room;
pub mod transcript;

// ── Top-level re-exports ─────────────────────────────────────────────

pub use avatar::{AvatarHandle, AvatarService};
pub use conversation::{ConversationConfig, ConversationService, ConversationSession};
pub use error::{Result, ServiceError};
pub use llm::TextGenerator;
pub use memory::{MemoryBackend, MemoryEntry, MemoryKind, MemoryMessage, MemoryMetadata};
pub use room::{ParticipantInfo, Room, RoomConnector, RoomEvent, TrackKind};
pub use transcript::{SpeakerRole, TranscriptFragment, TranscriptObserver};
