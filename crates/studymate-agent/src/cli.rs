use clap::Parser;
use studymate_core::capture::MarkerVerbosity;
use studymate_core::config::{AvatarConfig, LiveKitConfig, Mem0Config, normalize_language};

/// Launch contract of an agent process. Every value comes from the
/// environment the supervisor sets; flags exist for local runs.
#[derive(Parser, Debug)]
#[command(name = "studymate-agent")]
#[command(version, about = "StudyMate - per-room voice agent")]
pub struct AgentArgs {
    /// Room to join
    #[arg(long, env = "STUDYMATE_ROOM")]
    pub room: String,

    /// Conversation language; anything but en-US is served in Mandarin
    #[arg(long, env = "LANGUAGE", default_value = "en-US")]
    pub language: String,

    /// Student display name, also the memory key
    #[arg(long, env = "USER_DISPLAY_NAME")]
    pub display_name: Option<String>,

    #[arg(long, env = "LIVEKIT_URL")]
    pub livekit_url: String,

    #[arg(long, env = "LIVEKIT_API_KEY", hide_env_values = true)]
    pub livekit_api_key: String,

    #[arg(long, env = "LIVEKIT_API_SECRET", hide_env_values = true)]
    pub livekit_api_secret: String,

    #[arg(long, env = "TAVUS_API_KEY", hide_env_values = true)]
    pub tavus_api_key: Option<String>,

    #[arg(long, env = "TAVUS_REPLICA_ID")]
    pub tavus_replica_id: Option<String>,

    #[arg(long, env = "TAVUS_PERSONA_ID")]
    pub tavus_persona_id: Option<String>,

    /// Required: the conversation cannot run without it
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: String,

    /// Text model used for session summaries
    #[arg(long, env = "GEMINI_MODEL")]
    pub gemini_model: Option<String>,

    /// Realtime model used for the conversation
    #[arg(long, env = "GEMINI_LIVE_MODEL")]
    pub live_model: Option<String>,

    #[arg(long, env = "MEM0_API_KEY", hide_env_values = true)]
    pub mem0_api_key: Option<String>,

    #[arg(long, env = "MEM0_ORG_ID")]
    pub mem0_org_id: Option<String>,

    #[arg(long, env = "MEM0_PROJECT_ID")]
    pub mem0_project_id: Option<String>,

    /// Session marker detail when no summary can be written
    #[arg(long, env = "STUDYMATE_MARKER_VERBOSITY", default_value = "with-last-utterance")]
    pub marker_verbosity: MarkerVerbosity,
}

impl AgentArgs {
    pub fn language(&self) -> &'static str {
        normalize_language(&self.language)
    }

    pub fn livekit(&self) -> LiveKitConfig {
        LiveKitConfig::new(
            self.livekit_url.clone(),
            self.livekit_api_key.clone(),
            self.livekit_api_secret.clone(),
        )
    }

    pub fn avatar(&self) -> Option<AvatarConfig> {
        AvatarConfig::from_parts(
            self.tavus_api_key.clone(),
            self.tavus_replica_id.clone(),
            self.tavus_persona_id.clone(),
        )
    }

    pub fn mem0(&self) -> Option<Mem0Config> {
        let api_key = self.mem0_api_key.clone().filter(|key| !key.trim().is_empty())?;
        let mut config = Mem0Config::new(api_key);
        config.org_id = self.mem0_org_id.clone();
        config.project_id = self.mem0_project_id.clone();
        Some(config)
    }
}
