//! In-process harness for handler tests: a real router over an [`AppCore`]
//! whose agents are `/bin/sh` scripts.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use studymate_core::AppCore;
use studymate_core::config::{AgentProcessConfig, AvatarConfig, LiveKitConfig};
use studymate_core::credentials::CredentialIssuer;
use studymate_core::memory::MemoryClient;
use studymate_core::push::PushSender;
use studymate_core::supervisor::{AgentSupervisor, ProcessLauncher, SupervisorConfig};
use studymate_core::testkit::FakePushSender;
use studymate_traits::TextGenerator;
use tower::ServiceExt;

use super::state::AppState;

pub struct TestCore {
    avatar: bool,
    script: String,
    warmup: Duration,
    memory: Option<MemoryClient>,
    generator: Option<Arc<dyn TextGenerator>>,
    push: Arc<dyn PushSender>,
}

impl Default for TestCore {
    fn default() -> Self {
        Self {
            avatar: false,
            script: "exec sleep 30".to_string(),
            warmup: Duration::from_millis(100),
            memory: None,
            generator: None,
            push: Arc::new(FakePushSender::default()),
        }
    }
}

impl TestCore {
    pub const LIVEKIT_URL: &'static str = "wss://studymate-test.livekit.cloud";
    pub const SECRET: &'static str = "test-secret-with-enough-entropy-0123456789";

    pub fn with_avatar(mut self) -> Self {
        self.avatar = true;
        self
    }

    /// Shell script each agent process runs.
    pub fn with_script(mut self, script: &str) -> Self {
        self.script = script.to_string();
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_memory(mut self, memory: MemoryClient) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_push(mut self, push: Arc<dyn PushSender>) -> Self {
        self.push = push;
        self
    }

    pub fn build(self) -> AppState {
        let issuer =
            CredentialIssuer::new(LiveKitConfig::new(Self::LIVEKIT_URL, "test-key", Self::SECRET))
                .unwrap();
        let agent = AgentProcessConfig {
            program: "/bin/sh".into(),
            args: vec!["-c".to_string(), self.script],
            warmup: self.warmup,
            terminate_grace: Duration::from_secs(1),
            ..AgentProcessConfig::default()
        };
        let supervisor = Arc::new(AgentSupervisor::new(
            Arc::new(ProcessLauncher::new(agent.clone())),
            SupervisorConfig::from(&agent),
        ));
        let avatar = self
            .avatar
            .then(|| AvatarConfig::new("tavus-test-9876", "replica-1", "persona-1"));
        Arc::new(AppCore::from_parts(
            issuer,
            supervisor,
            self.memory,
            self.generator,
            avatar,
            self.push,
        ))
    }
}

async fn send(core: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = super::router(core.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(core: &AppState, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(core, request).await
}

pub async fn post_json(core: &AppState, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(core, request).await
}
