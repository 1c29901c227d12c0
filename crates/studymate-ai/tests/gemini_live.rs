use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use studymate_ai::{GeminiLiveConfig, GeminiLiveService};
use studymate_traits::{
    ConversationConfig, ConversationService, SpeakerRole, TranscriptFragment, TranscriptObserver,
};

#[derive(Default)]
struct CollectingObserver {
    fragments: Mutex<Vec<TranscriptFragment>>,
}

impl TranscriptObserver for CollectingObserver {
    fn on_fragment(&self, fragment: TranscriptFragment) {
        self.fragments.lock().unwrap().push(fragment);
    }
}

fn session_config() -> ConversationConfig {
    ConversationConfig {
        room_name: "room-1".to_string(),
        instructions: "You are a study partner.".to_string(),
        language: "en-US".to_string(),
        voice: "Aoede".to_string(),
        temperature: 0.1,
    }
}

/// Minimal BidiGenerateContent server: acknowledges setup, streams one
/// exchange with a model audio part mixed in, then forwards every client
/// frame to `client_frames`.
async fn spawn_fake_server(
    send_setup_complete: bool,
) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let setup = ws.next().await.unwrap().unwrap();
        let setup: Value = serde_json::from_str(setup.to_text().unwrap()).unwrap();
        tx.send(setup).unwrap();
        if !send_setup_complete {
            tokio::time::sleep(Duration::from_secs(5)).await;
            return;
        }
        ws.send(Message::Text(json!({"setupComplete": {}}).to_string().into()))
            .await
            .unwrap();

        for frame in [
            json!({"serverContent": {"inputTranscription": {"text": "I'm stuck on "}}}),
            json!({"serverContent": {"inputTranscription": {"text": "fractions"}}}),
            json!({"serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}
            ]}}}),
            json!({"serverContent": {"outputTranscription": {"text": "Let's take "}}}),
            json!({"serverContent": {
                "outputTranscription": {"text": "it slowly."},
                "turnComplete": true
            }}),
        ] {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        while let Some(Ok(message)) = ws.next().await {
            if let Ok(text) = message.to_text()
                && let Ok(value) = serde_json::from_str::<Value>(text)
            {
                let _ = tx.send(value);
            }
        }
    });

    (format!("ws://{}", addr), rx)
}

#[tokio::test]
async fn transcripts_reach_observer_and_replies_are_sent() {
    let (endpoint, mut frames) = spawn_fake_server(true).await;
    let service = GeminiLiveService::new(GeminiLiveConfig::new("key").with_endpoint(endpoint));
    let observer = Arc::new(CollectingObserver::default());

    let session = service
        .start(session_config(), observer.clone())
        .await
        .expect("session should start");

    let setup = frames.recv().await.unwrap();
    assert_eq!(
        setup["setup"]["systemInstruction"]["parts"][0]["text"],
        "You are a study partner."
    );

    session
        .generate_reply("Greet the user warmly.")
        .await
        .expect("reply request should be sent");
    let turn = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        turn["clientContent"]["turns"][0]["parts"][0]["text"],
        "Greet the user warmly."
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if observer.fragments.lock().unwrap().len() >= 2 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "fragments never arrived");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let fragments = observer.fragments.lock().unwrap().clone();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].role, SpeakerRole::User);
    assert_eq!(fragments[0].text, "I'm stuck on fractions");
    assert_eq!(fragments[1].role, SpeakerRole::Assistant);
    assert_eq!(fragments[1].text, "Let's take it slowly.");

    session.close().await.unwrap();
    assert!(session.generate_reply("again").await.is_err());
}

#[tokio::test]
async fn missing_setup_complete_times_out() {
    let (endpoint, _frames) = spawn_fake_server(false).await;
    let service = GeminiLiveService::new(
        GeminiLiveConfig::new("key")
            .with_endpoint(endpoint)
            .with_setup_timeout(Duration::from_millis(200)),
    );

    let result = service
        .start(session_config(), Arc::new(CollectingObserver::default()))
        .await;
    assert!(result.is_err());
}
