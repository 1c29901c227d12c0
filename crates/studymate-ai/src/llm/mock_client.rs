//! Deterministic mock text generator for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use studymate_traits::{ServiceError, TextGenerator};

/// Deterministic step for scripted mock generations.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    Text(String),
    Error(String),
}

/// Scripted generation step.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MockStepKind::Text(content.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: MockStepKind::Error(message.into()),
        }
    }
}

/// A text generator driven by scripted steps. Records every prompt.
#[derive(Debug, Clone)]
pub struct MockTextGenerator {
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockTextGenerator {
    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> studymate_traits::Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        let Some(step) = self.script.lock().await.pop_front() else {
            return Err(ServiceError::Other("mock script exhausted".to_string()));
        };
        match step.kind {
            MockStepKind::Text(text) => Ok(text),
            MockStepKind::Error(message) => Err(ServiceError::Other(message)),
        }
    }
}
