//! Service settings shared by the server and the agent process.
//!
//! Loading them (TOML, environment, CLI) is the binaries' job; this module
//! only defines the shapes and the environment contract between the
//! supervisor and the agent process it spawns.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variables an agent process is launched with.
pub mod env {
    pub const ROOM: &str = "STUDYMATE_ROOM";
    pub const LANGUAGE: &str = "LANGUAGE";
    pub const USER_DISPLAY_NAME: &str = "USER_DISPLAY_NAME";
    pub const LIVEKIT_URL: &str = "LIVEKIT_URL";
    pub const LIVEKIT_API_KEY: &str = "LIVEKIT_API_KEY";
    pub const LIVEKIT_API_SECRET: &str = "LIVEKIT_API_SECRET";
    pub const TAVUS_API_KEY: &str = "TAVUS_API_KEY";
    pub const TAVUS_REPLICA_ID: &str = "TAVUS_REPLICA_ID";
    pub const TAVUS_PERSONA_ID: &str = "TAVUS_PERSONA_ID";
    pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
    pub const MEM0_API_KEY: &str = "MEM0_API_KEY";
    pub const MEM0_ORG_ID: &str = "MEM0_ORG_ID";
    pub const MEM0_PROJECT_ID: &str = "MEM0_PROJECT_ID";
}

pub const LANG_EN: &str = "en-US";
pub const LANG_ZH: &str = "cmn-CN";

/// Anything that is not `en-US` is served in Mandarin.
pub fn normalize_language(code: &str) -> &'static str {
    if code == LANG_EN { LANG_EN } else { LANG_ZH }
}

#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    pub token_ttl: Duration,
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }

    /// HTTP(S) base of the room service (the `ws(s)://` url with its scheme swapped).
    pub fn http_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            url.to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvatarConfig {
    pub api_key: String,
    pub replica_id: String,
    pub persona_id: String,
    pub base_url: String,
}

impl AvatarConfig {
    pub fn new(
        api_key: impl Into<String>,
        replica_id: impl Into<String>,
        persona_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            replica_id: replica_id.into(),
            persona_id: persona_id.into(),
            base_url: "https://tavusapi.com".to_string(),
        }
    }

    /// All three credentials present and non-blank.
    pub fn from_parts(
        api_key: Option<String>,
        replica_id: Option<String>,
        persona_id: Option<String>,
    ) -> Option<Self> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Some(Self::new(
            present(api_key)?,
            present(replica_id)?,
            present(persona_id)?,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct Mem0Config {
    pub api_key: String,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub base_url: String,
}

impl Mem0Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            org_id: None,
            project_id: None,
            base_url: "https://api.mem0.ai".to_string(),
        }
    }
}

/// How agent processes are launched and supervised.
#[derive(Debug, Clone)]
pub struct AgentProcessConfig {
    /// Agent executable. Defaults to `studymate-agent` next to the current binary.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Time given to a fresh process before its liveness is judged.
    pub warmup: Duration,
    pub reap_interval: Duration,
    /// Wait between SIGTERM and SIGKILL.
    pub terminate_grace: Duration,
    /// When set, each agent writes to `<log_dir>/agent-<room>.log`.
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentProcessConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            args: Vec::new(),
            warmup: Duration::from_millis(500),
            reap_interval: Duration::from_secs(5),
            terminate_grace: Duration::from_secs(5),
            log_dir: None,
        }
    }
}

fn default_agent_program() -> PathBuf {
    let name = if cfg!(windows) {
        "studymate-agent.exe"
    } else {
        "studymate-agent"
    };
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}
