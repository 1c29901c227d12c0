pub mod avatar;
pub mod calls;
pub mod capture;
pub mod config;
pub mod credentials;
mod http;
pub mod memory;
pub mod push;
pub mod room;
pub mod session;
pub mod starters;
pub mod supervisor;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

use std::sync::Arc;

use anyhow::Context;
use studymate_ai::GeminiClient;
use studymate_traits::TextGenerator;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use calls::{CallRegistry, PushTokenRegistry};
use config::{AgentProcessConfig, AvatarConfig, LiveKitConfig, Mem0Config};
use credentials::CredentialIssuer;
use memory::{Mem0Backend, MemoryClient};
use push::{ExpoPushClient, PushSender};
use supervisor::{AgentLaunch, AgentSupervisor, ProcessLauncher, SupervisorConfig, service_env};

/// Everything the server needs to assemble [`AppCore`].
#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub livekit: LiveKitConfig,
    pub avatar: Option<AvatarConfig>,
    pub google_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub mem0: Option<Mem0Config>,
    pub agent: AgentProcessConfig,
}

/// Server-side state, created once at startup and shared by every handler.
pub struct AppCore {
    pub issuer: CredentialIssuer,
    pub supervisor: Arc<AgentSupervisor>,
    pub memory: Option<MemoryClient>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub avatar: Option<AvatarConfig>,
    pub calls: CallRegistry,
    shutdown: broadcast::Sender<()>,
}

impl AppCore {
    pub fn new(settings: CoreSettings) -> anyhow::Result<Self> {
        let issuer = CredentialIssuer::new(settings.livekit.clone())
            .context("LiveKit credentials are required")?;

        if settings.avatar.is_none() {
            warn!("Avatar credentials not fully configured; avatar features disabled");
        }
        let memory = match &settings.mem0 {
            Some(mem0) => Some(MemoryClient::new(Arc::new(Mem0Backend::new(mem0.clone())))),
            None => {
                warn!("MEM0_API_KEY not set; memory features disabled");
                None
            }
        };
        let generator: Option<Arc<dyn TextGenerator>> = match &settings.google_api_key {
            Some(key) => {
                let mut client = GeminiClient::new(key.clone());
                if let Some(model) = &settings.gemini_model {
                    client = client.with_model(model.clone());
                }
                Some(Arc::new(client))
            }
            None => {
                warn!("GOOGLE_API_KEY not set; conversation starters use fallback questions");
                None
            }
        };

        let launcher = ProcessLauncher::new(settings.agent.clone()).with_service_env(service_env(
            &settings.livekit,
            settings.avatar.as_ref(),
            settings.google_api_key.as_deref(),
            settings.mem0.as_ref(),
        ));
        let supervisor = Arc::new(AgentSupervisor::new(
            Arc::new(launcher),
            SupervisorConfig::from(&settings.agent),
        ));

        info!(
            livekit = %settings.livekit.url,
            agent = %settings.agent.program.display(),
            memory = memory.is_some(),
            "Initializing StudyMate core"
        );
        Ok(Self::from_parts(
            issuer,
            supervisor,
            memory,
            generator,
            settings.avatar,
            Arc::new(ExpoPushClient::default()),
        ))
    }

    pub fn from_parts(
        issuer: CredentialIssuer,
        supervisor: Arc<AgentSupervisor>,
        memory: Option<MemoryClient>,
        generator: Option<Arc<dyn TextGenerator>>,
        avatar: Option<AvatarConfig>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            issuer,
            supervisor,
            memory,
            generator,
            avatar,
            calls: CallRegistry::new(Arc::new(PushTokenRegistry::new()), push),
            shutdown,
        }
    }

    pub fn avatar_enabled(&self) -> bool {
        self.avatar.is_some()
    }

    /// Start (or reuse) the room's agent. Without avatar credentials no
    /// agent is launched.
    pub async fn ensure_agent(
        &self,
        room_name: &str,
        language: &str,
        display_name: Option<String>,
    ) -> bool {
        if !self.avatar_enabled() {
            warn!(room = %room_name, "Avatar credentials not configured, not starting agent");
            return false;
        }
        let launch = AgentLaunch::new(room_name, language).with_display_name(display_name);
        self.supervisor.ensure_agent(launch).await
    }

    /// Fire-and-forget variant used by the join flow.
    pub fn spawn_ensure_agent(
        self: &Arc<Self>,
        room_name: String,
        language: String,
        display_name: Option<String>,
    ) -> JoinHandle<bool> {
        let core = self.clone();
        tokio::spawn(async move {
            core.ensure_agent(&room_name, &language, display_name).await
        })
    }

    /// Start the background reaper. It stops on [`AppCore::shutdown`].
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let supervisor = self.supervisor.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move { supervisor.run(shutdown).await })
    }

    /// Stop the reaper and terminate every agent process.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(());
        self.supervisor.shutdown_all().await;
        info!("StudyMate core shut down");
    }
}
