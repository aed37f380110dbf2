//! Event types broadcast to session observers.
//!
//! Hosts subscribe through [`SessionController`](crate::session::SessionController)
//! and render these however they like (terminal, IPC bridge, …). All types
//! serialize with camelCase fields so JSON surfaces match the usual
//! client-side conventions.

use serde::{Deserialize, Serialize};

/// Connection lifecycle of one voice session.
///
/// Starts `Disconnected`; `Connecting` while the audio graphs and transport
/// are being acquired; `Connected` once the remote service confirms the
/// session; `Error` after an unrecoverable failure (manual reconnect only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

/// Emitted whenever the connection status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: ConnectionStatus,
    /// Short, non-technical description shown to the user on `Error`.
    pub detail: Option<String>,
}

/// Emitted once per capture tick with the current input level.
///
/// Published regardless of mute state so level meters keep moving while the
/// microphone is muted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLevelEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Normalized input level in [0.0, 1.0].
    pub level: f32,
}

/// Pass-through transcription of synthesized speech, when the service
/// provides one. No storage or correctness guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub seq: u64,
    pub text: String,
}

/// Point-in-time view of everything a UI needs to render a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    pub is_muted: bool,
    pub volume_level: f32,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, "connecting");
        let back: ConnectionStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, ConnectionStatus::Connecting);
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<ConnectionStatus>(r#""Connected""#).is_err());
    }

    #[test]
    fn snapshot_serializes_with_camel_case_fields() {
        let snapshot = SessionSnapshot {
            status: ConnectionStatus::Connected,
            is_muted: true,
            volume_level: 0.25,
            error: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["isMuted"], true);
        let level = json["volumeLevel"].as_f64().unwrap();
        assert!((level - 0.25).abs() < 1e-6);
        assert!(json["error"].is_null());
    }

    #[test]
    fn level_event_round_trips() {
        let event = AudioLevelEvent { seq: 9, level: 0.8 };
        let json = serde_json::to_string(&event).unwrap();
        let back: AudioLevelEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 9);
        assert!((back.level - 0.8).abs() < 1e-6);
    }
}
