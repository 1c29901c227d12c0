//! Gemini Live (BidiGenerateContent) wire messages.

use serde::Deserialize;
use serde_json::{Value, json};

use studymate_traits::{ConversationConfig, SpeakerRole, TranscriptFragment};

pub(crate) fn setup_message(model: &str, config: &ConversationConfig) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "temperature": config.temperature,
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": config.voice }
                    },
                    "languageCode": config.language,
                }
            },
            "systemInstruction": {
                "parts": [{ "text": config.instructions }]
            },
            "inputAudioTranscription": {},
            "outputAudioTranscription": {},
        }
    })
}

pub(crate) fn text_turn(text: &str) -> Value {
    json!({
        "clientContent": {
            "turns": [{ "role": "user", "parts": [{ "text": text }] }],
            "turnComplete": true,
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerContent {
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Transcription {
    #[serde(default)]
    pub text: String,
}

/// Collects streamed transcription chunks into whole utterances.
///
/// Gemini streams transcriptions a few words at a time; a fragment is
/// emitted per speaker once the turn completes or is interrupted.
#[derive(Debug, Default)]
pub(crate) struct TranscriptAccumulator {
    user: String,
    assistant: String,
}

impl TranscriptAccumulator {
    pub fn absorb(&mut self, content: &ServerContent) -> Vec<TranscriptFragment> {
        let mut fragments = Vec::new();
        if let Some(input) = &content.input_transcription {
            self.user.push_str(&input.text);
        }
        if let Some(output) = &content.output_transcription {
            // The user has finished speaking once the model starts answering.
            if self.assistant.is_empty() {
                fragments.extend(self.take_user());
            }
            self.assistant.push_str(&output.text);
        }
        if content.turn_complete || content.interrupted {
            fragments.extend(self.flush());
        }
        fragments
    }

    pub fn flush(&mut self) -> Vec<TranscriptFragment> {
        let mut fragments = Vec::new();
        fragments.extend(self.take_user());
        let assistant = std::mem::take(&mut self.assistant);
        if !assistant.trim().is_empty() {
            fragments.push(TranscriptFragment::new(
                SpeakerRole::Assistant,
                assistant.trim(),
            ));
        }
        fragments
    }

    fn take_user(&mut self) -> Option<TranscriptFragment> {
        let user = std::mem::take(&mut self.user);
        if user.trim().is_empty() {
            None
        } else {
            Some(TranscriptFragment::new(SpeakerRole::User, user.trim()))
        }
    }
}
