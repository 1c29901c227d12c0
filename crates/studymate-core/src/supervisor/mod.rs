//! Agent Process Supervisor.
//!
//! Owns the room → process map. At most one live agent process exists per
//! room; every mutation of the map (spawn, reap, terminate) happens under one
//! lock, and the lock is never held across an await.

mod launcher;

pub use launcher::{AgentLaunch, AgentLauncher, ProcessLauncher, service_env};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::AgentProcessConfig;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn agent for room {room}: {source}")]
    Spawn {
        room: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open agent log {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub warmup: Duration,
    pub reap_interval: Duration,
    pub terminate_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&AgentProcessConfig::default())
    }
}

impl From<&AgentProcessConfig> for SupervisorConfig {
    fn from(config: &AgentProcessConfig) -> Self {
        Self {
            warmup: config.warmup,
            reap_interval: config.reap_interval,
            terminate_grace: config.terminate_grace,
        }
    }
}

/// Liveness snapshot for one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub language: Option<String>,
    pub display_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

struct AgentRecord {
    child: Child,
    pid: Option<u32>,
    launch: AgentLaunch,
    started_at: DateTime<Utc>,
}

impl AgentRecord {
    /// `Ok(None)` while the process is alive.
    fn poll(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    fn status(&mut self) -> AgentStatus {
        let (running, exit_code) = match self.poll() {
            Ok(None) => (true, None),
            Ok(Some(status)) => (false, status.code()),
            Err(_) => (false, None),
        };
        AgentStatus {
            running,
            pid: self.pid,
            exit_code,
            language: Some(self.launch.language.clone()),
            display_name: self.launch.display_name.clone(),
            started_at: Some(self.started_at),
        }
    }
}

pub struct AgentSupervisor {
    launcher: Arc<dyn AgentLauncher>,
    config: SupervisorConfig,
    records: Mutex<HashMap<String, AgentRecord>>,
}

impl AgentSupervisor {
    pub fn new(launcher: Arc<dyn AgentLauncher>, config: SupervisorConfig) -> Self {
        Self {
            launcher,
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Make sure an agent is running for `launch.room_name`.
    ///
    /// Returns `true` when a live process already occupies the room, or when
    /// a freshly spawned one survives the warm-up interval. Never retries.
    pub async fn ensure_agent(&self, launch: AgentLaunch) -> bool {
        let room = launch.room_name.clone();
        let pid = {
            let mut records = self.records.lock();
            if let Some(record) = records.get_mut(&room) {
                match record.poll() {
                    Ok(None) => {
                        debug!(room = %room, pid = ?record.pid, "Agent already running");
                        return true;
                    }
                    Ok(Some(status)) => {
                        info!(room = %room, %status, "Clearing exited agent before respawn");
                        records.remove(&room);
                    }
                    Err(err) => {
                        warn!(
                            room = %room,
                            error = %err,
                            "Agent liveness check failed, replacing record"
                        );
                        records.remove(&room);
                    }
                }
            }

            let child = match self.launcher.launch(&launch) {
                Ok(child) => child,
                Err(err) => {
                    error!(room = %room, error = %err, "Failed to start agent");
                    return false;
                }
            };
            let pid = child.id();
            info!(
                room = %room,
                pid = ?pid,
                language = %launch.language,
                user = launch.display_name.as_deref().unwrap_or("-"),
                "Agent process spawned"
            );
            records.insert(
                room.clone(),
                AgentRecord {
                    child,
                    pid,
                    launch,
                    started_at: Utc::now(),
                },
            );
            pid
        };

        tokio::time::sleep(self.config.warmup).await;

        let mut records = self.records.lock();
        let Some(record) = records.get_mut(&room).filter(|record| record.pid == pid) else {
            warn!(room = %room, pid = ?pid, "Agent record vanished during warm-up");
            return false;
        };
        match record.poll() {
            Ok(None) => {
                info!(room = %room, pid = ?pid, "Agent started");
                true
            }
            Ok(Some(status)) => {
                error!(room = %room, pid = ?pid, %status, "Agent exited during warm-up");
                records.remove(&room);
                false
            }
            Err(err) => {
                error!(room = %room, error = %err, "Agent liveness check failed");
                records.remove(&room);
                false
            }
        }
    }

    /// Non-blocking liveness probe.
    pub fn status(&self, room_name: &str) -> AgentStatus {
        self.records
            .lock()
            .get_mut(room_name)
            .map(AgentRecord::status)
            .unwrap_or_default()
    }

    pub fn is_running(&self, room_name: &str) -> bool {
        self.status(room_name).running
    }

    /// Every recorded room, including exited processes not yet reaped.
    pub fn snapshot(&self) -> BTreeMap<String, AgentStatus> {
        self.records
            .lock()
            .iter_mut()
            .map(|(room, record)| (room.clone(), record.status()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the room's agent: SIGTERM, then SIGKILL after the grace period.
    /// The record is removed regardless. Returns whether a record existed.
    pub async fn terminate(&self, room_name: &str) -> bool {
        let record = self.records.lock().remove(room_name);
        let Some(record) = record else {
            debug!(room = %room_name, "No agent to terminate");
            return false;
        };
        stop_child(room_name, record, self.config.terminate_grace).await;
        true
    }

    /// Terminate every agent concurrently.
    pub async fn shutdown_all(&self) {
        let records: Vec<(String, AgentRecord)> = self.records.lock().drain().collect();
        if records.is_empty() {
            return;
        }
        info!(count = records.len(), "Terminating all agents");
        let grace = self.config.terminate_grace;
        futures::future::join_all(
            records
                .into_iter()
                .map(|(room, record)| async move { stop_child(&room, record, grace).await }),
        )
        .await;
    }

    /// Remove every record whose process has exited. Returns the freed rooms.
    pub fn reap(&self) -> Vec<String> {
        let mut reaped = Vec::new();
        self.records.lock().retain(|room, record| match record.poll() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!(room = %room, pid = ?record.pid, %status, "Reaped exited agent");
                reaped.push(room.clone());
                false
            }
            Err(err) => {
                warn!(room = %room, error = %err, "Dropping agent with unknown state");
                reaped.push(room.clone());
                false
            }
        });
        reaped
    }

    /// Reap at the configured interval until shutdown is signalled.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Agent reaper shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.reap_interval) => {
                    let reaped = self.reap();
                    if !reaped.is_empty() {
                        debug!(count = reaped.len(), "Reaper freed rooms");
                    }
                }
            }
        }
    }
}

async fn stop_child(room: &str, mut record: AgentRecord, grace: Duration) {
    if let Ok(Some(status)) = record.poll() {
        debug!(room = %room, %status, "Agent already exited");
        return;
    }

    info!(room = %room, pid = ?record.pid, "Terminating agent");
    send_terminate(&mut record);

    match tokio::time::timeout(grace, record.child.wait()).await {
        Ok(Ok(status)) => info!(room = %room, %status, "Agent terminated gracefully"),
        Ok(Err(err)) => warn!(room = %room, error = %err, "Failed waiting for agent exit"),
        Err(_) => {
            warn!(room = %room, pid = ?record.pid, "Agent ignored SIGTERM, killing");
            if let Err(err) = record.child.kill().await {
                error!(room = %room, error = %err, "Failed to kill agent");
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(record: &mut AgentRecord) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = record.pid else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %err, "Failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_terminate(record: &mut AgentRecord) {
    if let Err(err) = record.child.start_kill() {
        warn!(pid = ?record.pid, error = %err, "Failed to stop agent");
    }
}
