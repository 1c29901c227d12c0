use std::sync::Arc;
use std::time::{Duration, Instant};

use studymate_ai::{MockStep, MockTextGenerator};
use studymate_core::capture::CaptureOutcome;
use studymate_core::memory::MemoryClient;
use studymate_core::session::prompts::FALLBACK_GREETING;
use studymate_core::session::{
    Departure, GreetingOutcome, SessionError, SessionInitializer, SessionReport, SessionSettings,
    SessionState,
};
use studymate_core::testkit::{
    FakeAvatarService, FakeConversationService, FakeRoom, FakeRoomConnector,
};
use studymate_traits::{MemoryKind, SpeakerRole, TranscriptFragment};
use tokio::task::JoinHandle;

const USER: &str = "henry-1a2b3c4d";

fn settings(display_name: Option<&str>) -> SessionSettings {
    let mut settings = SessionSettings::new("room-1", "en-US")
        .with_display_name(display_name.map(str::to_string));
    settings.participant_log_interval = Duration::from_secs(60);
    settings.finalize_timeout = Duration::from_secs(5);
    settings
}

type SessionTask = JoinHandle<Result<SessionReport, SessionError>>;

fn spawn_session(initializer: SessionInitializer) -> (Arc<SessionInitializer>, SessionTask) {
    let initializer = Arc::new(initializer);
    let task = {
        let initializer = initializer.clone();
        tokio::spawn(async move { initializer.run().await })
    };
    (initializer, task)
}

async fn wait_for_state(initializer: &SessionInitializer, state: SessionState) {
    let mut rx = initializer.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("state reached in time")
        .expect("state channel open");
}

async fn finish(task: JoinHandle<Result<SessionReport, SessionError>>) -> SessionReport {
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("session finished in time")
        .expect("session task joined")
        .expect("session ran")
}

#[tokio::test]
async fn avatar_failure_degrades_but_session_goes_active() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let conversation = FakeConversationService::new();
    let avatar = FakeAvatarService::failing();
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        conversation.clone(),
    )
    .with_avatar(avatar.clone());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert!(report.reached(SessionState::Degraded));
    assert!(!report.reached(SessionState::Ready));
    assert!(report.reached(SessionState::Active));
    assert!(!report.reached(SessionState::Failed));
    assert_eq!(report.final_state(), Some(SessionState::Terminated));
    assert!(!report.avatar_started);
    assert_eq!(report.greeting, Some(GreetingOutcome::Generated));
    assert_eq!(conversation.session().replies().len(), 1);
    assert!(conversation.session().is_closed());
    assert!(room.is_disconnected());
}

#[tokio::test]
async fn conversation_failure_fails_session_without_greeting() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let conversation = FakeConversationService::failing();
    let avatar = FakeAvatarService::new();
    let memory = MemoryClient::in_memory();
    let initializer = SessionInitializer::new(
        settings(Some("Henry")),
        FakeRoomConnector::new(room.clone()),
        conversation.clone(),
    )
    .with_avatar(avatar.clone())
    .with_memory(memory.clone());

    let report = initializer.run().await.expect("failure is reported, not raised");

    assert_eq!(report.final_state(), Some(SessionState::Failed));
    assert!(!report.reached(SessionState::Active));
    assert!(report.greeting.is_none());
    assert!(report.capture.is_none());
    assert!(conversation.session().replies().is_empty());
    assert!(conversation.session().said().is_empty());
    // The avatar that did start is cleaned up.
    assert_eq!(avatar.started(), 1);
    assert_eq!(avatar.stopped(), 1);
    assert!(memory.get_all("Henry").await.is_empty());
    assert!(room.is_disconnected());
}

#[tokio::test]
async fn state_progression_with_avatar() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let avatar = FakeAvatarService::new();
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        FakeConversationService::new(),
    )
    .with_avatar(avatar.clone());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(
        report.states,
        vec![
            SessionState::Connecting,
            SessionState::LoadingMemory,
            SessionState::StartingSubsessions,
            SessionState::Ready,
            SessionState::Active,
            SessionState::Finalizing,
            SessionState::Terminated,
        ]
    );
    assert_eq!(report.departure, Some(Departure::ParticipantLeft(USER.to_string())));
    assert_eq!(avatar.stopped(), 1);
}

#[tokio::test]
async fn connection_failure_is_fatal() {
    let room = FakeRoom::new("room-1");
    let conversation = FakeConversationService::new();
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::failing(room),
        conversation.clone(),
    );

    let err = initializer.run().await.unwrap_err();
    assert!(matches!(err, SessionError::Connect { .. }));
    assert!(conversation.configs().is_empty());
    assert_eq!(*initializer.subscribe_state().borrow(), SessionState::Failed);
}

#[tokio::test]
async fn subsessions_start_concurrently() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        FakeConversationService::slow(Duration::from_millis(400)),
    )
    .with_avatar(FakeAvatarService::slow(Duration::from_millis(400)));

    let started = Instant::now();
    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    assert!(started.elapsed() < Duration::from_millis(750));

    room.leave(USER);
    let report = finish(task).await;
    assert!(report.reached(SessionState::Ready));
}

#[tokio::test]
async fn memory_context_is_injected_and_greeting_tailored() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let memory = MemoryClient::in_memory();
    memory.add_memory("Henry", "Preparing for a calculus exam", "user").await;
    memory.add_memory("Henry", "Finds integration by parts hard", "user").await;
    let conversation = FakeConversationService::new();

    let mut settings = settings(Some("Henry"));
    settings.language = "zh".to_string();
    let initializer = SessionInitializer::new(
        settings,
        FakeRoomConnector::new(room.clone()),
        conversation.clone(),
    )
    .with_memory(memory.clone());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(report.memory_entries, 2);
    let config = &conversation.configs()[0];
    assert!(config.instructions.contains(concat!(
        "# Previous Conversation Memories\n",
        "1. Preparing for a calculus exam\n",
        "2. Finds integration by parts hard"
    )));
    assert_eq!(config.language, "cmn-CN");
    assert_eq!(config.voice, "Aoede");
    assert!(conversation.session().replies()[0].contains("returning student"));
}

#[tokio::test]
async fn empty_transcript_still_writes_session_marker() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let memory = MemoryClient::in_memory();
    let initializer = SessionInitializer::new(
        settings(Some("Henry")),
        FakeRoomConnector::new(room.clone()),
        FakeConversationService::new(),
    )
    .with_memory(memory.clone());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(report.capture, Some(CaptureOutcome::Marker { stored: true }));
    let entries = memory.get_all("Henry").await;
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].memory.is_empty());
    assert_eq!(entries[0].kind(), Some(MemoryKind::SessionMarker));
}

#[tokio::test]
async fn transcript_is_summarized_on_departure() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let memory = MemoryClient::in_memory();
    let conversation = FakeConversationService::new();
    let summarizer = Arc::new(MockTextGenerator::from_steps(
        "mock",
        vec![MockStep::text("Henry reviewed Newton's laws and will practise free-body diagrams.")],
    ));
    let initializer = SessionInitializer::new(
        settings(Some("Henry")),
        FakeRoomConnector::new(room.clone()),
        conversation.clone(),
    )
    .with_memory(memory.clone())
    .with_summarizer(summarizer.clone());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    assert!(conversation.emit(TranscriptFragment::new(
        SpeakerRole::User,
        "Can we go over Newton's laws?"
    )));
    assert!(conversation.emit(TranscriptFragment::new(
        SpeakerRole::Assistant,
        "Sure, start with inertia."
    )));
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(report.capture, Some(CaptureOutcome::Summary { stored: true }));
    let prompt = &summarizer.prompts().await[0];
    assert!(prompt.contains("Student: Can we go over Newton's laws?"));
    assert!(prompt.contains("StudyMate: Sure, start with inertia."));
    let entries = memory.get_all("Henry").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind(), Some(MemoryKind::SessionSummary));
}

#[tokio::test]
async fn failed_greeting_falls_back_to_script() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let conversation = FakeConversationService::with_failing_greeting(false);
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        conversation.clone(),
    );

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(report.greeting, Some(GreetingOutcome::Fallback));
    assert_eq!(conversation.session().said(), vec![FALLBACK_GREETING.to_string()]);
}

#[tokio::test]
async fn failed_fallback_greeting_does_not_abort() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let conversation = FakeConversationService::with_failing_greeting(true);
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        conversation,
    );

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(report.greeting, Some(GreetingOutcome::Failed));
    assert_eq!(report.final_state(), Some(SessionState::Terminated));
}

#[tokio::test]
async fn avatar_leaving_does_not_end_session_but_room_close_does() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        FakeConversationService::new(),
    )
    .with_avatar(FakeAvatarService::new());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.join("ai-assistant-0000beef");
    room.leave("ai-assistant-0000beef");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished());

    room.close("room deleted");
    let report = finish(task).await;
    assert_eq!(report.departure, Some(Departure::RoomClosed("room deleted".to_string())));
}

#[tokio::test]
async fn session_without_user_key_skips_memory() {
    let room = FakeRoom::new("room-1").with_participant(USER);
    let memory = MemoryClient::in_memory();
    memory.add_memory("Henry", "Should not be loaded", "user").await;
    let conversation = FakeConversationService::new();
    let initializer = SessionInitializer::new(
        settings(None),
        FakeRoomConnector::new(room.clone()),
        conversation.clone(),
    )
    .with_memory(memory.clone());

    let (initializer, task) = spawn_session(initializer);
    wait_for_state(&initializer, SessionState::Active).await;
    room.leave(USER);
    let report = finish(task).await;

    assert_eq!(report.memory_entries, 0);
    assert!(report.capture.is_none());
    assert!(!conversation.configs()[0].instructions.contains("Previous Conversation Memories"));
    assert_eq!(memory.get_all("Henry").await.len(), 1);
}

#[tokio::test]
async fn session_waits_for_room_that_does_not_exist_yet() {
    use serde_json::json;
    use studymate_core::config::LiveKitConfig;
    use studymate_core::credentials::CredentialIssuer;
    use studymate_core::room::{LiveKitConnector, RoomPollConfig, RoomServiceClient};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIST: &str = "/twirp/livekit.RoomService/ListParticipants";
    // The mock server is local; keep any system proxy out of the way.
    unsafe { std::env::set_var("STUDYMATE_DISABLE_SYSTEM_PROXY", "1") };
    let server = MockServer::start().await;
    // Connect and the participant snapshot run before the student joins.
    Mock::given(method("POST"))
        .and(path(LIST))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "not_found",
            "msg": "requested room does not exist"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LIST))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participants": [{"identity": USER, "name": "Henry", "tracks": []}]
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LIST))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"participants": []})))
        .mount(&server)
        .await;

    let issuer = CredentialIssuer::new(LiveKitConfig::new("wss://lk.example", "key", "secret"))
        .expect("issuer");
    let rooms = RoomServiceClient::new(issuer).with_base_url(server.uri());
    let connector = LiveKitConnector::new(rooms)
        .with_poll_config(RoomPollConfig {
            interval: Duration::from_millis(20),
            max_failures: 3,
        });
    let conversation = FakeConversationService::new();
    let initializer = SessionInitializer::new(settings(None), Arc::new(connector), conversation);

    let (_, task) = spawn_session(initializer);
    let report = finish(task).await;

    assert!(report.reached(SessionState::Active));
    assert_eq!(report.final_state(), Some(SessionState::Terminated));
    assert_eq!(report.departure, Some(Departure::ParticipantLeft(USER.to_string())));
}
