use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use studymate_core::CoreSettings;
use studymate_core::config::{
    AgentProcessConfig, AvatarConfig, LiveKitConfig, Mem0Config, env as agent_env,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub core: CoreSettings,
}

/// `server.toml`. Any value missing from the file is taken from the
/// environment, so secrets can stay out of the file.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    livekit: LiveKitSection,
    #[serde(default)]
    avatar: AvatarSection,
    #[serde(default)]
    google: GoogleSection,
    #[serde(default)]
    memory: MemorySection,
    #[serde(default)]
    agent: AgentSection,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct LiveKitSection {
    url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AvatarSection {
    api_key: Option<String>,
    replica_id: Option<String>,
    persona_id: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GoogleSection {
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MemorySection {
    api_key: Option<String>,
    org_id: Option<String>,
    project_id: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AgentSection {
    program: Option<PathBuf>,
    #[serde(default)]
    args: Vec<String>,
    warmup_ms: Option<u64>,
    reap_interval_secs: Option<u64>,
    terminate_grace_secs: Option<u64>,
    log_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_livekit_url() -> String {
    "ws://localhost:7880".to_string()
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let file_config = load_from_file()?.unwrap_or_default();
        Ok(Self::resolve(file_config, |key| env::var(key).ok()))
    }

    fn resolve(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = file
            .server
            .host
            .or_else(|| var("HOST"))
            .unwrap_or_else(default_host);
        let port = file
            .server
            .port
            .or_else(|| var("PORT").and_then(|value| value.parse::<u16>().ok()))
            .unwrap_or_else(default_port);

        let mut livekit = LiveKitConfig::new(
            file.livekit
                .url
                .or_else(|| var(agent_env::LIVEKIT_URL))
                .unwrap_or_else(default_livekit_url),
            file.livekit
                .api_key
                .or_else(|| var(agent_env::LIVEKIT_API_KEY))
                .unwrap_or_default(),
            file.livekit
                .api_secret
                .or_else(|| var(agent_env::LIVEKIT_API_SECRET))
                .unwrap_or_default(),
        );
        if let Some(ttl) = file.livekit.token_ttl_secs {
            livekit.token_ttl = Duration::from_secs(ttl);
        }

        let avatar = AvatarConfig::from_parts(
            file.avatar.api_key.or_else(|| var(agent_env::TAVUS_API_KEY)),
            file.avatar
                .replica_id
                .or_else(|| var(agent_env::TAVUS_REPLICA_ID)),
            file.avatar
                .persona_id
                .or_else(|| var(agent_env::TAVUS_PERSONA_ID)),
        )
        .map(|mut avatar| {
            if let Some(base_url) = file.avatar.base_url {
                avatar.base_url = base_url;
            }
            avatar
        });

        let mem0 = file
            .memory
            .api_key
            .or_else(|| var(agent_env::MEM0_API_KEY))
            .map(|api_key| {
                let mut mem0 = Mem0Config::new(api_key);
                mem0.org_id = file.memory.org_id.or_else(|| var(agent_env::MEM0_ORG_ID));
                mem0.project_id = file
                    .memory
                    .project_id
                    .or_else(|| var(agent_env::MEM0_PROJECT_ID));
                if let Some(base_url) = file.memory.base_url {
                    mem0.base_url = base_url;
                }
                mem0
            });

        let mut agent = AgentProcessConfig::default();
        if let Some(program) = file
            .agent
            .program
            .or_else(|| var("STUDYMATE_AGENT_PROGRAM").map(PathBuf::from))
        {
            agent.program = program;
        }
        agent.args = file.agent.args;
        if let Some(ms) = file.agent.warmup_ms {
            agent.warmup = Duration::from_millis(ms);
        }
        if let Some(secs) = file.agent.reap_interval_secs {
            agent.reap_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.agent.terminate_grace_secs {
            agent.terminate_grace = Duration::from_secs(secs);
        }
        agent.log_dir = file
            .agent
            .log_dir
            .or_else(|| var("STUDYMATE_AGENT_LOG_DIR").map(PathBuf::from));

        Self {
            host,
            port,
            core: CoreSettings {
                livekit,
                avatar,
                google_api_key: file.google.api_key.or_else(|| var(agent_env::GOOGLE_API_KEY)),
                gemini_model: file.google.model.or_else(|| var("GEMINI_MODEL")),
                mem0,
                agent,
            },
        }
    }
}

fn load_from_file() -> anyhow::Result<Option<FileConfig>> {
    let config_path = env::var("STUDYMATE_SERVER_CONFIG").ok();
    let path = if let Some(path) = config_path {
        Some(path)
    } else if Path::new("server.toml").exists() {
        Some("server.toml".to_string())
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path, err))?;
    let parsed: FileConfig = toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path, err))?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = ServerConfig::resolve(FileConfig::default(), env_of(&[]));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3001);
        assert!(config.core.avatar.is_none());
        assert!(config.core.mem0.is_none());
        assert!(config.core.google_api_key.is_none());
        assert!(config.core.livekit.api_key.is_empty());
    }

    #[test]
    fn environment_fills_every_section() {
        let config = ServerConfig::resolve(
            FileConfig::default(),
            env_of(&[
                ("HOST", "0.0.0.0"),
                ("PORT", "8080"),
                ("LIVEKIT_URL", "wss://demo.livekit.cloud"),
                ("LIVEKIT_API_KEY", "lk-key"),
                ("LIVEKIT_API_SECRET", "lk-secret"),
                ("TAVUS_API_KEY", "tavus"),
                ("TAVUS_REPLICA_ID", "r1"),
                ("TAVUS_PERSONA_ID", "p1"),
                ("GOOGLE_API_KEY", "g"),
                ("MEM0_API_KEY", "m"),
                ("MEM0_ORG_ID", "org"),
            ]),
        );
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.core.livekit.url, "wss://demo.livekit.cloud");
        assert_eq!(config.core.livekit.api_secret, "lk-secret");
        let avatar = config.core.avatar.expect("avatar configured");
        assert_eq!(avatar.replica_id, "r1");
        let mem0 = config.core.mem0.expect("memory configured");
        assert_eq!(mem0.org_id.as_deref(), Some("org"));
        assert!(mem0.project_id.is_none());
        assert_eq!(config.core.google_api_key.as_deref(), Some("g"));
    }

    #[test]
    fn file_values_win_over_environment() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 4000

            [livekit]
            api_key = "file-key"
            token_ttl_secs = 60

            [agent]
            program = "/opt/studymate/agent"
            args = ["--verbose"]
            warmup_ms = 100
            log_dir = "/var/log/studymate"
            "#,
        )
        .expect("valid toml");
        let config = ServerConfig::resolve(
            file,
            env_of(&[
                ("PORT", "9999"),
                ("LIVEKIT_API_KEY", "env-key"),
                ("LIVEKIT_API_SECRET", "env-secret"),
            ]),
        );
        assert_eq!(config.port, 4000);
        assert_eq!(config.core.livekit.api_key, "file-key");
        assert_eq!(config.core.livekit.api_secret, "env-secret");
        assert_eq!(config.core.livekit.token_ttl, Duration::from_secs(60));
        assert_eq!(
            config.core.agent.program,
            PathBuf::from("/opt/studymate/agent")
        );
        assert_eq!(config.core.agent.args, vec!["--verbose"]);
        assert_eq!(config.core.agent.warmup, Duration::from_millis(100));
        assert_eq!(
            config.core.agent.log_dir,
            Some(PathBuf::from("/var/log/studymate"))
        );
    }

    #[test]
    fn partial_avatar_credentials_disable_avatar() {
        let config = ServerConfig::resolve(
            FileConfig::default(),
            env_of(&[("TAVUS_API_KEY", "tavus"), ("TAVUS_REPLICA_ID", "r1")]),
        );
        assert!(config.core.avatar.is_none());
    }

    #[test]
    fn unparsable_port_uses_default() {
        let config = ServerConfig::resolve(FileConfig::default(), env_of(&[("PORT", "web")]));
        assert_eq!(config.port, 3001);
    }
}
