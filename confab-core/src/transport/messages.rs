//! Wire message types for the bidirectional generate-content protocol.
//!
//! Client-bound messages use snake_case field names, server messages arrive
//! camelCase — the asymmetry is the service's, not ours. Unknown fields are
//! ignored on parse so protocol additions don't break existing sessions.

use serde::{Deserialize, Serialize};

use super::LiveSessionParams;

/// Modality requested for responses: synthesized speech only.
const AUDIO_MODALITY: &str = "AUDIO";

/// MIME type for outbound microphone chunks.
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// First message on the socket: session parameters.
#[derive(Debug, Clone, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, Serialize)]
pub struct Setup {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Streaming microphone audio.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl SetupMessage {
    pub fn for_session(params: &LiveSessionParams) -> Self {
        Self {
            setup: Setup {
                model: params.model.clone(),
                generation_config: Some(GenerationConfig {
                    response_modalities: vec![AUDIO_MODALITY.to_string()],
                    temperature: params.temperature,
                    speech_config: Some(SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: params.voice_name.clone(),
                            },
                        },
                        language_code: params.language.clone(),
                    }),
                }),
                system_instruction: Some(Content {
                    parts: vec![Part {
                        text: Some(params.system_instruction.clone()),
                        inline_data: None,
                    }],
                }),
            },
        }
    }
}

impl RealtimeInputMessage {
    /// Wrap one base64 PCM chunk for transmission.
    pub fn audio_chunk(data: String) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: INPUT_AUDIO_MIME.to_string(),
                    data,
                }],
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Shared content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    /// Session open confirmation. Payload is an empty object today.
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<Content>,
    /// Barge-in: the user started speaking over the synthesized audio.
    pub interrupted: Option<bool>,
    pub turn_complete: Option<bool>,
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Transcription {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LiveSessionParams {
        LiveSessionParams {
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice_name: "Puck".into(),
            system_instruction: "You are a helpful voice assistant.".into(),
            temperature: Some(1.0),
            language: Some("en-US".into()),
        }
    }

    #[test]
    fn setup_serializes_with_snake_case_wire_fields() {
        let json = serde_json::to_value(SetupMessage::for_session(&params())).unwrap();

        assert_eq!(
            json["setup"]["model"],
            "models/gemini-2.5-flash-native-audio-preview-09-2025"
        );
        let config = &json["setup"]["generation_config"];
        assert_eq!(config["response_modalities"][0], "AUDIO");
        assert_eq!(
            config["speech_config"]["voice_config"]["prebuilt_voice_config"]["voice_name"],
            "Puck"
        );
        assert_eq!(config["speech_config"]["language_code"], "en-US");
        assert_eq!(
            json["setup"]["system_instruction"]["parts"][0]["text"],
            "You are a helpful voice assistant."
        );
    }

    #[test]
    fn setup_omits_absent_optionals() {
        let mut p = params();
        p.temperature = None;
        p.language = None;
        let json = serde_json::to_value(SetupMessage::for_session(&p)).unwrap();
        let config = &json["setup"]["generation_config"];
        assert!(config.get("temperature").is_none());
        assert!(config["speech_config"].get("language_code").is_none());
    }

    #[test]
    fn audio_chunk_serializes_with_mime_and_payload() {
        let json =
            serde_json::to_value(RealtimeInputMessage::audio_chunk("QUJD".into())).unwrap();
        let chunk = &json["realtime_input"]["media_chunks"][0];
        assert_eq!(chunk["mime_type"], INPUT_AUDIO_MIME);
        assert_eq!(chunk["data"], "QUJD");
    }

    #[test]
    fn parses_setup_complete() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());
    }

    #[test]
    fn parses_model_turn_with_inline_audio() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAEC"}}
                    ]
                },
                "turnComplete": false
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = msg.server_content.unwrap();
        let parts = content.model_turn.unwrap().parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].inline_data.as_ref().unwrap().data, "AAEC");
        assert_eq!(content.turn_complete, Some(false));
    }

    #[test]
    fn parses_interruption_and_ignores_unknown_fields() {
        let raw = r#"{
            "serverContent": {"interrupted": true, "generationComplete": true},
            "usageMetadata": {"totalTokenCount": 42}
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.server_content.unwrap().interrupted, Some(true));
    }
}
