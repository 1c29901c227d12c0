//! In-process fakes of every remote seam, for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use studymate_traits::{
    AvatarHandle, AvatarService, ConversationConfig, ConversationService, ConversationSession,
    ParticipantInfo, Result, Room, RoomConnector, RoomEvent, ServiceError, TranscriptFragment,
    TranscriptObserver,
};
use tokio::sync::broadcast;

use crate::push::{PushMessage, PushSender};

pub fn participant(identity: &str) -> ParticipantInfo {
    ParticipantInfo {
        identity: identity.to_string(),
        name: identity.to_string(),
        microphone_enabled: true,
        camera_enabled: true,
    }
}

// ── Room ────────────────────────────────────────────────────────────

pub struct FakeRoom {
    name: String,
    participants: Mutex<Vec<ParticipantInfo>>,
    events: broadcast::Sender<RoomEvent>,
    disconnected: AtomicBool,
}

impl FakeRoom {
    pub fn new(name: &str) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            name: name.to_string(),
            participants: Mutex::new(Vec::new()),
            events,
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn with_participant(self: Arc<Self>, identity: &str) -> Arc<Self> {
        self.participants.lock().push(participant(identity));
        self
    }

    pub fn join(&self, identity: &str) {
        let info = participant(identity);
        self.participants.lock().push(info.clone());
        let _ = self.events.send(RoomEvent::ParticipantConnected(info));
    }

    pub fn leave(&self, identity: &str) {
        let removed = {
            let mut participants = self.participants.lock();
            let index = participants.iter().position(|p| p.identity == identity);
            index.map(|index| participants.remove(index))
        };
        if let Some(info) = removed {
            let _ = self.events.send(RoomEvent::ParticipantDisconnected(info));
        }
    }

    pub fn close(&self, reason: &str) {
        let _ = self.events.send(RoomEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Room for FakeRoom {
    fn name(&self) -> &str {
        &self.name
    }

    async fn participants(&self) -> Result<Vec<ParticipantInfo>> {
        Ok(self.participants.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

pub struct FakeRoomConnector {
    room: Arc<FakeRoom>,
    fail: bool,
    connects: AtomicUsize,
}

impl FakeRoomConnector {
    pub fn new(room: Arc<FakeRoom>) -> Arc<Self> {
        Arc::new(Self {
            room,
            fail: false,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn failing(room: Arc<FakeRoom>) -> Arc<Self> {
        Arc::new(Self {
            room,
            fail: true,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomConnector for FakeRoomConnector {
    async fn connect(&self, _room_name: &str) -> Result<Arc<dyn Room>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::transport("livekit", "connection refused"));
        }
        Ok(self.room.clone())
    }
}

// ── Avatar ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAvatarService {
    fail: bool,
    delay: Duration,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl FakeAvatarService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvatarService for FakeAvatarService {
    async fn start(&self, room: &dyn Room) -> Result<AvatarHandle> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ServiceError::Http {
                service: "tavus".to_string(),
                status: 500,
                message: "replica unavailable".to_string(),
            });
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(AvatarHandle {
            participant_identity: "ai-assistant-0000beef".to_string(),
            session_id: format!("avatar-{}", room.name()),
        })
    }

    async fn stop(&self, _handle: &AvatarHandle) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Conversation ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeConversationSession {
    fail_reply: bool,
    fail_say: bool,
    replies: Mutex<Vec<String>>,
    said: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl FakeConversationSession {
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().clone()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationSession for FakeConversationSession {
    async fn generate_reply(&self, instructions: &str) -> Result<()> {
        self.replies.lock().push(instructions.to_string());
        if self.fail_reply {
            return Err(ServiceError::Closed("reply rejected".to_string()));
        }
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<()> {
        self.said.lock().push(text.to_string());
        if self.fail_say {
            return Err(ServiceError::Closed("say rejected".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConversationService {
    fail_start: bool,
    delay: Duration,
    session: Arc<FakeConversationSession>,
    configs: Mutex<Vec<ConversationConfig>>,
    observer: Mutex<Option<Arc<dyn TranscriptObserver>>>,
}

impl FakeConversationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_start: true,
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// Sessions whose greeting request fails; `say_fails` also breaks the fallback.
    pub fn with_failing_greeting(say_fails: bool) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(FakeConversationSession {
                fail_reply: true,
                fail_say: say_fails,
                ..FakeConversationSession::default()
            }),
            ..Self::default()
        })
    }

    pub fn session(&self) -> Arc<FakeConversationSession> {
        self.session.clone()
    }

    pub fn configs(&self) -> Vec<ConversationConfig> {
        self.configs.lock().clone()
    }

    /// Deliver a transcript fragment as the speech pipeline would.
    pub fn emit(&self, fragment: TranscriptFragment) -> bool {
        let observer = self.observer.lock().clone();
        match observer {
            Some(observer) => {
                observer.on_fragment(fragment);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ConversationService for FakeConversationService {
    async fn start(
        &self,
        config: ConversationConfig,
        observer: Arc<dyn TranscriptObserver>,
    ) -> Result<Arc<dyn ConversationSession>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.configs.lock().push(config);
        if self.fail_start {
            return Err(ServiceError::transport("gemini-live", "handshake refused"));
        }
        *self.observer.lock() = Some(observer);
        Ok(self.session.clone())
    }
}

// ── Push ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakePushSender {
    /// Tokens containing this marker fail with a transport error.
    fail_marker: Option<String>,
    sent: Mutex<Vec<PushMessage>>,
}

impl FakePushSender {
    pub fn failing_for(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PushSender for FakePushSender {
    async fn send(&self, message: &PushMessage) -> Result<bool> {
        if let Some(marker) = &self.fail_marker
            && message.to.contains(marker.as_str())
        {
            return Err(ServiceError::transport("expo-push", "timed out"));
        }
        self.sent.lock().push(message.clone());
        Ok(true)
    }
}
