mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::AgentArgs;
use studymate_ai::{GeminiClient, GeminiLiveConfig, GeminiLiveService};
use studymate_core::avatar::TavusAvatarService;
use studymate_core::credentials::CredentialIssuer;
use studymate_core::memory::{Mem0Backend, MemoryClient};
use studymate_core::room::{LiveKitConnector, RoomServiceClient};
use studymate_core::session::{SessionInitializer, SessionSettings, SessionState};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,studymate_agent=debug,studymate_core=debug".into()),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    let args = AgentArgs::parse();
    let initializer = build_session(&args)?;

    info!(
        room = %args.room,
        language = args.language(),
        user = args.display_name.as_deref().unwrap_or("-"),
        "Agent process starting"
    );

    tokio::select! {
        result = initializer.run() => {
            let report = result.context("Session could not start")?;
            if report.final_state() == Some(SessionState::Failed) {
                bail!("Session for room {} failed to start its conversation", args.room);
            }
            info!(room = %args.room, states = ?report.states, "Session finished");
        }
        _ = shutdown_signal() => {
            warn!(room = %args.room, "Termination requested, leaving room");
        }
    }
    Ok(())
}

fn build_session(args: &AgentArgs) -> Result<SessionInitializer> {
    let issuer =
        CredentialIssuer::new(args.livekit()).context("LiveKit credentials are required")?;

    let mut settings = SessionSettings::new(args.room.clone(), args.language())
        .with_display_name(args.display_name.clone());
    settings.marker_verbosity = args.marker_verbosity;

    let connector = Arc::new(LiveKitConnector::new(RoomServiceClient::new(issuer.clone())));

    let mut live = GeminiLiveConfig::new(args.google_api_key.clone());
    if let Some(model) = &args.live_model {
        live = live.with_model(model.clone());
    }
    let conversation = Arc::new(GeminiLiveService::new(live));

    let mut summarizer = GeminiClient::new(args.google_api_key.clone());
    if let Some(model) = &args.gemini_model {
        summarizer = summarizer.with_model(model.clone());
    }

    let mut initializer = SessionInitializer::new(settings, connector, conversation)
        .with_summarizer(Arc::new(summarizer));

    match args.avatar() {
        Some(avatar) => {
            initializer =
                initializer.with_avatar(Arc::new(TavusAvatarService::new(avatar, issuer)));
        }
        None => warn!("Avatar credentials incomplete; running audio-only"),
    }
    match args.mem0() {
        Some(mem0) => {
            initializer =
                initializer.with_memory(MemoryClient::new(Arc::new(Mem0Backend::new(mem0))));
        }
        None => warn!("MEM0_API_KEY not set; session runs without memory"),
    }

    Ok(initializer)
}

/// Resolves on Ctrl-C, or on SIGTERM from the supervisor.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
