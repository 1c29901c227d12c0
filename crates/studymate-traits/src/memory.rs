//! Key-scoped memory store abstractions.
//!
//! A user key is any caller-supplied string (display name or device id). It
//! scopes memory, it does not authenticate anyone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What produced a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Message,
    ConversationTurn,
    SessionSummary,
    SessionMarker,
}

/// One chat-style message handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Metadata attached to every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryKind>,
}

impl MemoryMetadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            role: None,
            kind: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A stored, immutable memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub memory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MemoryMetadata>,
    /// Relevance score, only present on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl MemoryEntry {
    pub fn new(memory: impl Into<String>) -> Self {
        Self {
            id: None,
            memory: memory.into(),
            created_at: None,
            metadata: None,
            score: None,
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|meta| meta.role.as_deref())
    }

    pub fn kind(&self) -> Option<MemoryKind> {
        self.metadata.as_ref().and_then(|meta| meta.kind)
    }
}

/// Remote (or in-process) key-scoped memory capability.
///
/// Entries are append-only. `get_all` returns insertion order; `search` may
/// reorder by relevance.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn add(
        &self,
        user_key: &str,
        messages: &[MemoryMessage],
        metadata: &MemoryMetadata,
    ) -> Result<()>;

    async fn search(&self, user_key: &str, query: &str, limit: usize) -> Result<Vec<MemoryEntry>>;

    /// Everything stored for `user_key`. Unknown keys yield an empty list.
    async fn get_all(&self, user_key: &str) -> Result<Vec<MemoryEntry>>;

    /// Irreversibly removes every entry for `user_key`.
    async fn delete_all(&self, user_key: &str) -> Result<()>;

    /// Distinct user keys known to the store.
    async fn list_users(&self) -> Result<Vec<String>>;
}
