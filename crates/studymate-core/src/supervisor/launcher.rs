use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use super::SupervisorError;
use crate::config::{AgentProcessConfig, AvatarConfig, LiveKitConfig, Mem0Config, env};

/// Launch parameters for one room's agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLaunch {
    pub room_name: String,
    pub language: String,
    pub display_name: Option<String>,
}

impl AgentLaunch {
    pub fn new(room_name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            room_name: room_name.into(),
            language: language.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name.filter(|name| !name.trim().is_empty());
        self
    }
}

/// Starts an agent OS process for a room.
pub trait AgentLauncher: Send + Sync {
    fn launch(&self, request: &AgentLaunch) -> Result<Child, SupervisorError>;
}

/// Launches the configured agent program with the room contract in its
/// environment. Children are killed if their handle is dropped.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: AgentProcessConfig,
    service_env: Vec<(&'static str, String)>,
}

impl ProcessLauncher {
    pub fn new(config: AgentProcessConfig) -> Self {
        Self {
            config,
            service_env: Vec::new(),
        }
    }

    /// Adds service credentials every agent receives.
    pub fn with_service_env(mut self, vars: Vec<(&'static str, String)>) -> Self {
        self.service_env.extend(vars);
        self
    }

    pub fn log_path(&self, room_name: &str) -> Option<PathBuf> {
        self.config
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("agent-{}.log", sanitize(room_name))))
    }
}

impl AgentLauncher for ProcessLauncher {
    fn launch(&self, request: &AgentLaunch) -> Result<Child, SupervisorError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args);
        cmd.envs(self.service_env.iter().map(|(k, v)| (*k, v.as_str())));
        cmd.env(env::ROOM, &request.room_name);
        cmd.env(env::LANGUAGE, &request.language);
        cmd.env(
            env::USER_DISPLAY_NAME,
            request.display_name.as_deref().unwrap_or_default(),
        );
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        if let Some(path) = self.log_path(&request.room_name) {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|source| SupervisorError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            }
            let log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| SupervisorError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            let stderr = log.try_clone().map_err(|source| SupervisorError::LogFile {
                path: path.clone(),
                source,
            })?;
            cmd.stdout(log);
            cmd.stderr(stderr);
        }

        debug!(
            room = %request.room_name,
            program = %self.config.program.display(),
            "Spawning agent process"
        );
        cmd.spawn().map_err(|source| SupervisorError::Spawn {
            room: request.room_name.clone(),
            source,
        })
    }
}

/// Credentials forwarded to every agent process.
pub fn service_env(
    livekit: &LiveKitConfig,
    avatar: Option<&AvatarConfig>,
    google_api_key: Option<&str>,
    mem0: Option<&Mem0Config>,
) -> Vec<(&'static str, String)> {
    let mut vars = vec![
        (env::LIVEKIT_URL, livekit.url.clone()),
        (env::LIVEKIT_API_KEY, livekit.api_key.clone()),
        (env::LIVEKIT_API_SECRET, livekit.api_secret.clone()),
    ];
    if let Some(avatar) = avatar {
        vars.push((env::TAVUS_API_KEY, avatar.api_key.clone()));
        vars.push((env::TAVUS_REPLICA_ID, avatar.replica_id.clone()));
        vars.push((env::TAVUS_PERSONA_ID, avatar.persona_id.clone()));
    }
    if let Some(key) = google_api_key {
        vars.push((env::GOOGLE_API_KEY, key.to_string()));
    }
    if let Some(mem0) = mem0 {
        vars.push((env::MEM0_API_KEY, mem0.api_key.clone()));
        if let Some(org_id) = &mem0.org_id {
            vars.push((env::MEM0_ORG_ID, org_id.clone()));
        }
        if let Some(project_id) = &mem0.project_id {
            vars.push((env::MEM0_PROJECT_ID, project_id.clone()));
        }
    }
    vars
}

/// Room names are client-chosen; keep log file names to a safe alphabet.
fn sanitize(room_name: &str) -> String {
    room_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
