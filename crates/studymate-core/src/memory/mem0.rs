//! Mem0 platform backend (`https://api.mem0.ai`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use studymate_traits::{MemoryBackend, MemoryEntry, MemoryMessage, MemoryMetadata, Result};
use tracing::debug;

use crate::config::Mem0Config;
use crate::http::{build_client, check, transport};

const SERVICE: &str = "mem0";

pub struct Mem0Backend {
    client: Client,
    config: Mem0Config,
}

/// List endpoints answer either with a bare array or `{"results": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { results: items } => items,
        }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    id: Option<String>,
    #[serde(default)]
    memory: String,
    created_at: Option<String>,
    metadata: Option<Value>,
    score: Option<f32>,
}

impl From<RawMemory> for MemoryEntry {
    fn from(raw: RawMemory) -> Self {
        MemoryEntry {
            id: raw.id,
            memory: raw.memory,
            created_at: raw
                .created_at
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            // Entries written by other clients may carry foreign metadata.
            metadata: raw
                .metadata
                .and_then(|value| serde_json::from_value::<MemoryMetadata>(value).ok()),
            score: raw.score,
        }
    }
}

#[derive(Deserialize)]
struct Entity {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

impl Mem0Backend {
    pub fn new(config: Mem0Config) -> Self {
        Self {
            client: build_client(Duration::from_secs(30)),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Token {}", self.config.api_key))
    }

    /// `user_id` plus the optional org/project scope as a query string.
    fn scope_query(&self, user_key: &str) -> String {
        let mut params = vec![format!("user_id={}", urlencoding::encode(user_key))];
        if let Some(org_id) = &self.config.org_id {
            params.push(format!("org_id={}", urlencoding::encode(org_id)));
        }
        if let Some(project_id) = &self.config.project_id {
            params.push(format!("project_id={}", urlencoding::encode(project_id)));
        }
        params.join("&")
    }

    fn scope_body(&self, body: &mut Value) {
        if let Some(org_id) = &self.config.org_id {
            body["org_id"] = json!(org_id);
        }
        if let Some(project_id) = &self.config.project_id {
            body["project_id"] = json!(project_id);
        }
    }

    async fn fetch_memories(&self, request: reqwest::RequestBuilder) -> Result<Vec<MemoryEntry>> {
        let response = request.send().await.map_err(|e| transport(SERVICE, e))?;
        let listing: Listing<RawMemory> = check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| studymate_traits::ServiceError::invalid_response(SERVICE, e))?;
        Ok(listing.into_vec().into_iter().map(MemoryEntry::from).collect())
    }
}

#[async_trait]
impl MemoryBackend for Mem0Backend {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn add(
        &self,
        user_key: &str,
        messages: &[MemoryMessage],
        metadata: &MemoryMetadata,
    ) -> Result<()> {
        let mut body = json!({
            "messages": messages,
            "user_id": user_key,
            "metadata": metadata,
        });
        self.scope_body(&mut body);

        let response = self
            .request(reqwest::Method::POST, self.url("/v1/memories/"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        check(SERVICE, response).await?;
        debug!(user = %user_key, messages = messages.len(), "mem0 add accepted");
        Ok(())
    }

    async fn search(&self, user_key: &str, query: &str, limit: usize) -> Result<Vec<MemoryEntry>> {
        let mut body = json!({
            "query": query,
            "user_id": user_key,
            "limit": limit,
        });
        self.scope_body(&mut body);
        let request = self
            .request(reqwest::Method::POST, self.url("/v1/memories/search/"))
            .json(&body);
        let mut entries = self.fetch_memories(request).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    async fn get_all(&self, user_key: &str) -> Result<Vec<MemoryEntry>> {
        let url = self.url(&format!("/v1/memories/?{}", self.scope_query(user_key)));
        self.fetch_memories(self.request(reqwest::Method::GET, url)).await
    }

    async fn delete_all(&self, user_key: &str) -> Result<()> {
        let url = self.url(&format!("/v1/memories/?{}", self.scope_query(user_key)));
        let response = self
            .request(reqwest::Method::DELETE, url)
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        check(SERVICE, response).await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let response = self
            .request(reqwest::Method::GET, self.url("/v1/entities/"))
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        let listing: Listing<Entity> = check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| studymate_traits::ServiceError::invalid_response(SERVICE, e))?;
        Ok(listing
            .into_vec()
            .into_iter()
            .filter(|entity| entity.kind == "user")
            .map(|entity| entity.name)
            .collect())
    }
}
