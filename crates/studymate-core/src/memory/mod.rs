//! Memory Store Client.
//!
//! [`MemoryClient`] is the only way the rest of the system talks to the
//! memory store. Every remote failure is logged and swallowed here: writes
//! report `false`, reads report an empty list.

mod in_memory;
mod mem0;

pub use in_memory::InMemoryBackend;
pub use mem0::Mem0Backend;

use std::sync::Arc;

use studymate_traits::{MemoryBackend, MemoryEntry, MemoryKind, MemoryMessage, MemoryMetadata};
use tracing::{debug, info, warn};

pub const CONTEXT_HEADER: &str = "# Previous Conversation Memories";

/// How many entries the agent loads as context by default.
pub const DEFAULT_CONTEXT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct MemoryClient {
    backend: Arc<dyn MemoryBackend>,
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl MemoryClient {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Append one user/assistant exchange as a single entry.
    pub async fn add_turn(
        &self,
        user_key: &str,
        user_message: &str,
        assistant_message: &str,
    ) -> bool {
        let messages = [
            MemoryMessage::user(user_message),
            MemoryMessage::assistant(assistant_message),
        ];
        let metadata = MemoryMetadata::now().with_kind(MemoryKind::ConversationTurn);
        self.write(user_key, &messages, metadata, "conversation turn").await
    }

    /// Append a single message tagged with `role`.
    pub async fn add_memory(&self, user_key: &str, message: &str, role: &str) -> bool {
        let messages = [MemoryMessage::new(role, message)];
        let metadata = MemoryMetadata::now().with_role(role);
        self.write(user_key, &messages, metadata, "memory").await
    }

    /// Append a single message with an explicit kind tag.
    pub async fn add_tagged(
        &self,
        user_key: &str,
        message: &str,
        role: &str,
        kind: MemoryKind,
    ) -> bool {
        let messages = [MemoryMessage::new(role, message)];
        let metadata = MemoryMetadata::now().with_role(role).with_kind(kind);
        self.write(user_key, &messages, metadata, "tagged memory").await
    }

    async fn write(
        &self,
        user_key: &str,
        messages: &[MemoryMessage],
        metadata: MemoryMetadata,
        what: &str,
    ) -> bool {
        match self.backend.add(user_key, messages, &metadata).await {
            Ok(()) => {
                info!(user = %user_key, backend = self.backend.name(), "Stored {}", what);
                true
            }
            Err(err) => {
                warn!(
                    user = %user_key,
                    backend = self.backend.name(),
                    error = %err,
                    "Failed to store {}",
                    what
                );
                false
            }
        }
    }

    /// Everything stored for `user_key`, in insertion order.
    pub async fn get_all(&self, user_key: &str) -> Vec<MemoryEntry> {
        match self.backend.get_all(user_key).await {
            Ok(entries) => {
                debug!(user = %user_key, count = entries.len(), "Loaded memories");
                entries
            }
            Err(err) => {
                warn!(user = %user_key, error = %err, "Failed to load memories");
                Vec::new()
            }
        }
    }

    /// The `limit` most recent entries, oldest first.
    pub async fn get_recent(&self, user_key: &str, limit: usize) -> Vec<MemoryEntry> {
        let mut entries = self.get_all(user_key).await;
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        entries
    }

    /// Relevance-ranked subset for `query`.
    pub async fn get_relevant(
        &self,
        user_key: &str,
        query: &str,
        limit: usize,
    ) -> Vec<MemoryEntry> {
        match self.backend.search(user_key, query, limit).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(user = %user_key, error = %err, "Memory search failed");
                Vec::new()
            }
        }
    }

    pub async fn delete_all(&self, user_key: &str) -> bool {
        match self.backend.delete_all(user_key).await {
            Ok(()) => {
                info!(user = %user_key, "Deleted all memories");
                true
            }
            Err(err) => {
                warn!(user = %user_key, error = %err, "Failed to delete memories");
                false
            }
        }
    }

    pub async fn list_users(&self) -> Vec<String> {
        match self.backend.list_users().await {
            Ok(users) => users,
            Err(err) => {
                warn!(error = %err, "Failed to list memory users");
                Vec::new()
            }
        }
    }
}

/// Numbered rendering of `entries` under [`CONTEXT_HEADER`], preserving order.
/// Empty input renders as an empty string.
pub fn format_for_context(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(CONTEXT_HEADER.to_string());
    for (i, entry) in entries.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, entry.memory));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use studymate_traits::{Result as ServiceResult, ServiceError};

    struct FailingBackend;

    #[async_trait]
    impl MemoryBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn add(&self, _: &str, _: &[MemoryMessage], _: &MemoryMetadata) -> ServiceResult<()> {
            Err(ServiceError::transport("memory", "connection refused"))
        }

        async fn search(&self, _: &str, _: &str, _: usize) -> ServiceResult<Vec<MemoryEntry>> {
            Err(ServiceError::transport("memory", "connection refused"))
        }

        async fn get_all(&self, _: &str) -> ServiceResult<Vec<MemoryEntry>> {
            Err(ServiceError::transport("memory", "connection refused"))
        }

        async fn delete_all(&self, _: &str) -> ServiceResult<()> {
            Err(ServiceError::transport("memory", "connection refused"))
        }

        async fn list_users(&self) -> ServiceResult<Vec<String>> {
            Err(ServiceError::transport("memory", "connection refused"))
        }
    }

    #[test]
    fn empty_entries_format_to_empty_string() {
        assert_eq!(format_for_context(&[]), "");
    }

    #[test]
    fn entries_format_in_input_order() {
        let entries = [MemoryEntry::new("A"), MemoryEntry::new("B")];
        assert_eq!(
            format_for_context(&entries),
            "# Previous Conversation Memories\n1. A\n2. B"
        );
    }

    #[tokio::test]
    async fn turn_round_trips_and_unknown_key_is_empty() {
        let client = MemoryClient::in_memory();
        assert!(client.add_turn("Henry", "I struggle with limits", "Let's go slowly").await);

        let entries = client.get_all("Henry").await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].memory.contains("I struggle with limits"));
        assert_eq!(entries[0].kind(), Some(MemoryKind::ConversationTurn));

        assert!(client.get_all("Nobody").await.is_empty());
    }

    #[tokio::test]
    async fn get_all_keeps_insertion_order() {
        let client = MemoryClient::in_memory();
        for i in 0..6 {
            assert!(client.add_memory("Isaac", &format!("note {i}"), "user").await);
        }
        let memories: Vec<String> = client
            .get_all("Isaac")
            .await
            .into_iter()
            .map(|entry| entry.memory)
            .collect();
        assert_eq!(
            memories,
            vec!["note 0", "note 1", "note 2", "note 3", "note 4", "note 5"]
        );
    }

    #[tokio::test]
    async fn get_recent_keeps_the_tail() {
        let client = MemoryClient::in_memory();
        for i in 0..12 {
            client.add_memory("Ada", &format!("note {i}"), "user").await;
        }
        let recent = client.get_recent("Ada", DEFAULT_CONTEXT_LIMIT).await;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].memory, "note 2");
        assert_eq!(recent[9].memory, "note 11");
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let client = MemoryClient::new(Arc::new(FailingBackend));
        assert!(!client.add_turn("Henry", "hi", "hello").await);
        assert!(!client.add_memory("Henry", "hi", "user").await);
        assert!(client.get_all("Henry").await.is_empty());
        assert!(client.get_relevant("Henry", "hi", 5).await.is_empty());
        assert!(!client.delete_all("Henry").await);
        assert!(client.list_users().await.is_empty());
    }
}
