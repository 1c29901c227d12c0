//! Process-local memory backend used when no remote store is configured
//! and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use studymate_traits::{MemoryBackend, MemoryEntry, MemoryMessage, MemoryMetadata, Result};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Vec<MemoryEntry>>,
    /// User keys in first-write order.
    users: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    store: RwLock<Store>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all users.
    pub fn len(&self) -> usize {
        self.store.read().entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query tokens present in `memory`.
fn overlap(query: &[String], memory: &str) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let haystack = tokens(memory);
    let hits = query.iter().filter(|token| haystack.contains(token)).count();
    hits as f32 / query.len() as f32
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn add(
        &self,
        user_key: &str,
        messages: &[MemoryMessage],
        metadata: &MemoryMetadata,
    ) -> Result<()> {
        let memory = messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let entry = MemoryEntry {
            id: Some(Uuid::new_v4().to_string()),
            memory,
            created_at: Some(metadata.timestamp),
            metadata: Some(metadata.clone()),
            score: None,
        };

        let mut store = self.store.write();
        if !store.entries.contains_key(user_key) {
            store.users.push(user_key.to_string());
        }
        store
            .entries
            .entry(user_key.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn search(&self, user_key: &str, query: &str, limit: usize) -> Result<Vec<MemoryEntry>> {
        let query = tokens(query);
        let store = self.store.read();
        let Some(entries) = store.entries.get(user_key) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<MemoryEntry> = entries
            .iter()
            .filter_map(|entry| {
                let score = overlap(&query, &entry.memory);
                (score > 0.0).then(|| MemoryEntry {
                    score: Some(score),
                    ..entry.clone()
                })
            })
            .collect();
        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| {
            b.score
                .unwrap_or_default()
                .total_cmp(&a.score.unwrap_or_default())
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_all(&self, user_key: &str) -> Result<Vec<MemoryEntry>> {
        Ok(self
            .store
            .read()
            .entries
            .get(user_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_all(&self, user_key: &str) -> Result<()> {
        let mut store = self.store.write();
        store.entries.remove(user_key);
        store.users.retain(|user| user != user_key);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        Ok(self.store.read().users.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn add(backend: &InMemoryBackend, user: &str, text: &str) {
        backend
            .add(user, &[MemoryMessage::user(text)], &MemoryMetadata::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_ranks_by_overlap() {
        let backend = InMemoryBackend::new();
        add(&backend, "Henry", "Worried about the chemistry exam").await;
        add(&backend, "Henry", "Enjoys basketball on weekends").await;
        add(&backend, "Henry", "Chemistry exam on Friday, revising moles").await;

        let results = backend.search("Henry", "chemistry exam friday", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].memory.contains("Friday"));
        assert!(results[0].score.unwrap() > results[1].score.unwrap());
    }

    #[tokio::test]
    async fn turn_is_one_entry() {
        let backend = InMemoryBackend::new();
        backend
            .add(
                "Henry",
                &[MemoryMessage::user("hi"), MemoryMessage::assistant("hello")],
                &MemoryMetadata::now(),
            )
            .await
            .unwrap();
        let all = backend.get_all("Henry").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].memory, "hi\nhello");
    }

    #[tokio::test]
    async fn delete_all_forgets_user() {
        let backend = InMemoryBackend::new();
        add(&backend, "Henry", "one").await;
        add(&backend, "Isaac", "two").await;
        assert_eq!(backend.list_users().await.unwrap(), vec!["Henry", "Isaac"]);

        backend.delete_all("Henry").await.unwrap();
        assert!(backend.get_all("Henry").await.unwrap().is_empty());
        assert_eq!(backend.list_users().await.unwrap(), vec!["Isaac"]);
        assert_eq!(backend.len(), 1);
    }
}
