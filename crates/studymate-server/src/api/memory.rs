use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use studymate_core::starters::{Starters, conversation_starters};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub total: usize,
}

/// Distinct users known to the memory store. Display names double as ids.
pub async fn list_users(State(state): State<AppState>) -> Json<UserList> {
    let mut names = match &state.memory {
        Some(memory) => memory.list_users().await,
        None => Vec::new(),
    };
    names.sort();
    names.dedup();

    let users: Vec<User> = names
        .into_iter()
        .map(|name| User {
            id: name.clone(),
            display_name: name,
        })
        .collect();
    Json(UserList {
        total: users.len(),
        users,
    })
}

#[derive(Debug, Deserialize)]
pub struct StartersRequest {
    pub display_name: String,
}

pub async fn starters(
    State(state): State<AppState>,
    Json(request): Json<StartersRequest>,
) -> Json<Starters> {
    Json(
        conversation_starters(
            state.memory.as_ref(),
            state.generator.as_deref(),
            &request.display_name,
        )
        .await,
    )
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{TestCore, get, post_json};
    use serde_json::json;
    use std::sync::Arc;
    use studymate_ai::{MockStep, MockTextGenerator};
    use studymate_core::memory::MemoryClient;
    use studymate_core::starters::{FALLBACK_STARTERS, NO_MEMORY_STARTERS};

    #[tokio::test]
    async fn users_empty_without_memory_store() {
        let core = TestCore::default().build();
        let (_, body) = get(&core, "/api/users").await;
        assert_eq!(body, json!({"users": [], "total": 0}));
    }

    #[tokio::test]
    async fn users_are_listed_sorted() {
        let memory = MemoryClient::in_memory();
        memory.add_memory("Zoe", "likes chemistry", "user").await;
        memory.add_memory("Isaac", "studies calculus", "user").await;
        let core = TestCore::default().with_memory(memory).build();

        let (_, body) = get(&core, "/api/users").await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["users"][0], json!({"id": "Isaac", "display_name": "Isaac"}));
        assert_eq!(body["users"][1]["id"], "Zoe");
    }

    #[tokio::test]
    async fn starters_for_unknown_user() {
        let core = TestCore::default()
            .with_memory(MemoryClient::in_memory())
            .build();
        let (_, body) = post_json(
            &core,
            "/api/conversation-starters",
            json!({"display_name": "Nobody"}),
        )
        .await;
        assert_eq!(body["starters"], json!(NO_MEMORY_STARTERS));
        assert_eq!(body["user_info"], "Nobody (no memory data yet)");
    }

    #[tokio::test]
    async fn starters_from_generated_questions() {
        let memory = MemoryClient::in_memory();
        memory
            .add_memory("Isaac", "Isaac is preparing for a calculus final", "user")
            .await;
        let generator = Arc::new(MockTextGenerator::from_steps(
            "mock",
            vec![MockStep::text(
                "```json\n[\"Ready for the calculus final?\", \"Want to review limits?\"]\n```",
            )],
        ));
        let core = TestCore::default()
            .with_memory(memory)
            .with_generator(generator)
            .build();

        let (_, body) = post_json(
            &core,
            "/api/conversation-starters",
            json!({"display_name": "Isaac"}),
        )
        .await;
        assert_eq!(
            body["starters"],
            json!(["Ready for the calculus final?", "Want to review limits?"])
        );
        assert_eq!(body["memory_count"], 1);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn generator_failure_falls_back() {
        let memory = MemoryClient::in_memory();
        memory.add_memory("Isaac", "likes physics", "user").await;
        let generator = Arc::new(MockTextGenerator::from_steps(
            "mock",
            vec![MockStep::error("quota exceeded")],
        ));
        let core = TestCore::default()
            .with_memory(memory)
            .with_generator(generator)
            .build();

        let (status, body) = post_json(
            &core,
            "/api/conversation-starters",
            json!({"display_name": "Isaac"}),
        )
        .await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["starters"], json!(FALLBACK_STARTERS));
        assert_eq!(body["error"], "Using fallback questions");
    }
}
