//! Ice-breaker questions generated from a user's study history.

use serde::Serialize;
use studymate_traits::TextGenerator;
use tracing::warn;

use crate::memory::{MemoryClient, format_for_context};

pub const NO_MEMORY_STARTERS: [&str; 3] = [
    "Hey! How's your studying going?",
    "What subjects are you focusing on these days?",
    "Need any study tips or motivation?",
];

pub const FALLBACK_STARTERS: [&str; 5] = [
    "Hey! How's your studying going?",
    "What subjects are you working on?",
    "Need any study help or tips?",
    "How are you feeling about your exams?",
    "Want to be study buddies?",
];

pub const FALLBACK_NOTICE: &str = "Using fallback questions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Starters {
    pub starters: Vec<String>,
    pub user_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn starters_prompt(memory_context: &str) -> String {
    format!(
        r#"Based on this user's study session history, generate 5 specific, friendly conversation
starter questions that another student could ask them to break the ice and build a study friendship.

User's Study History:
{memory_context}

Requirements:
1. Questions should be specific to topics they've studied
2. Casual and friendly tone (not formal)
3. Show genuine interest in their progress
4. Mix of questions about: their topics, challenges, progress, feelings
5. Keep each question under 15 words

Format: Return ONLY a JSON array of 5 strings, nothing else.
Example: ["How's your photosynthesis revision going?", "Need help with that algebra?", ...]"#
    )
}

/// Parse a JSON string array, tolerating markdown code fences.
pub fn parse_starters(text: &str) -> Option<Vec<String>> {
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let starters: Vec<String> = serde_json::from_str(cleaned).ok()?;
    let starters: Vec<String> = starters
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!starters.is_empty()).then_some(starters)
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Never fails: any error degrades to [`FALLBACK_STARTERS`].
pub async fn conversation_starters(
    memory: Option<&MemoryClient>,
    generator: Option<&dyn TextGenerator>,
    display_name: &str,
) -> Starters {
    let fallback = |reason: &str| {
        warn!(user = %display_name, reason, "Falling back to generic conversation starters");
        Starters {
            starters: owned(&FALLBACK_STARTERS),
            user_info: display_name.to_string(),
            memory_count: None,
            error: Some(FALLBACK_NOTICE.to_string()),
        }
    };

    let Some(memory) = memory else {
        return fallback("memory store not configured");
    };
    let memories = memory.get_all(display_name).await;
    if memories.is_empty() {
        return Starters {
            starters: owned(&NO_MEMORY_STARTERS),
            user_info: format!("{display_name} (no memory data yet)"),
            memory_count: None,
            error: None,
        };
    }

    let Some(generator) = generator else {
        return fallback("text generator not configured");
    };
    let prompt = starters_prompt(&format_for_context(&memories));
    match generator.generate(&prompt).await {
        Ok(text) => match parse_starters(&text) {
            Some(starters) => Starters {
                starters,
                user_info: display_name.to_string(),
                memory_count: Some(memories.len()),
                error: None,
            },
            None => fallback("model output was not a JSON array"),
        },
        Err(err) => fallback(&err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studymate_ai::{MockStep, MockTextGenerator};

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n[\"How's calculus?\", \"Ready for finals?\"]\n```";
        assert_eq!(
            parse_starters(text),
            Some(vec!["How's calculus?".to_string(), "Ready for finals?".to_string()])
        );
        assert_eq!(parse_starters("Sure! Here are some questions"), None);
        assert_eq!(parse_starters("[]"), None);
    }

    #[tokio::test]
    async fn unknown_user_gets_no_memory_set() {
        let memory = MemoryClient::in_memory();
        let starters = conversation_starters(Some(&memory), None, "Newbie").await;
        assert_eq!(starters.starters.len(), 3);
        assert_eq!(starters.user_info, "Newbie (no memory data yet)");
        assert!(starters.error.is_none());
    }

    #[tokio::test]
    async fn history_drives_generation() {
        let memory = MemoryClient::in_memory();
        memory.add_memory("Henry", "Revising organic chemistry", "user").await;
        let generator = MockTextGenerator::from_steps(
            "mock",
            vec![MockStep::text(
                r#"["How's organic chem going?", "Which reactions are tricky?",
                    "Want to quiz each other?", "Feeling ready for the test?",
                    "Any mnemonics you like?"]"#,
            )],
        );

        let starters = conversation_starters(Some(&memory), Some(&generator), "Henry").await;
        assert_eq!(starters.starters.len(), 5);
        assert_eq!(starters.memory_count, Some(1));
        assert!(generator.prompts().await[0].contains("1. Revising organic chemistry"));
    }

    #[tokio::test]
    async fn generator_failure_uses_fallback() {
        let memory = MemoryClient::in_memory();
        memory.add_memory("Henry", "Revising physics", "user").await;
        let generator = MockTextGenerator::from_steps("mock", vec![MockStep::error("503")]);

        let starters = conversation_starters(Some(&memory), Some(&generator), "Henry").await;
        assert_eq!(starters.starters, owned(&FALLBACK_STARTERS));
        assert_eq!(starters.error.as_deref(), Some(FALLBACK_NOTICE));
    }
}
