//! `SessionController` — connection lifecycle for one voice session.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionController::new()                         status: Disconnected
//!     └─► connect(config)                          status: Connecting
//!         ├─ open output device + timeline
//!         ├─ open microphone + tick loop
//!         ├─ open transport, send setup
//!         └─ spawn driver task (owns all three)
//!             └─ `Opened` event                    status: Connected
//!                 └─► disconnect() / remote close  status: Disconnected
//!                     remote error                 status: Error
//! ```
//!
//! ## Ownership
//!
//! The driver task is the sole owner of the session's resources (capture
//! pipeline, playback scheduler, transport handle) and the only place that
//! wires them together: capture frames go to the transport writer, transport
//! events go to the playback timeline and status. Teardown therefore happens
//! in exactly one place, whatever ended the session, and drops everything as
//! one bundle.
//!
//! ## Guards
//!
//! `connect` is a no-op while the status is already `Connecting`/`Connected`
//! and while a teardown is still in flight (the cleaning-up flag), so a
//! disconnect-then-reconnect can never overlap two sets of audio devices.
//! Callers of `connect`/`disconnect` serialize on the session slot mutex.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    capture::CapturePipeline,
    codec,
    error::{ConfabError, Result},
    ipc::events::{
        AudioLevelEvent, ConnectionStatus, SessionSnapshot, SessionStatusEvent, TranscriptEvent,
    },
    playback::PlaybackScheduler,
    transport::{self, LiveHandle, LiveSessionParams, ServerEvent},
    OUTPUT_SAMPLE_RATE,
};

/// Broadcast capacity per event channel; slow observers lag, never block.
const BROADCAST_CAP: usize = 256;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE: &str = "Puck";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant.";

// Generic user-facing failure strings. Technical detail goes to the log,
// never to the UI.
const MSG_CONNECT_FAILED: &str = "Unable to connect to the voice service. Please try again.";
const MSG_MICROPHONE: &str =
    "Microphone access is required. Please allow microphone access and try again.";
const MSG_PLAYBACK: &str = "Unable to play audio. Please check your audio settings.";
const MSG_CONNECTION_LOST: &str =
    "Network connection lost. Please check your internet connection.";
const MSG_SERVICE_ERROR: &str =
    "Voice service is temporarily unavailable. Please try again later.";
const MSG_UNEXPECTED: &str = "Something went wrong. Please try again.";

/// Everything needed to open one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub voice_name: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    /// BCP-47 speech language code, e.g. `en-US`.
    pub language: Option<String>,
    pub api_key: String,
    /// Override of the service endpoint; `None` uses the default.
    pub endpoint: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            voice_name: DEFAULT_VOICE.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: None,
            language: None,
            api_key: String::new(),
            endpoint: None,
        }
    }
}

/// State shared between the controller, the driver task, and the capture
/// tick thread. All mutation goes through interior mutability; the `Arc`
/// fields are handed to the capture pipeline.
struct Shared {
    status: Mutex<ConnectionStatus>,
    error: Mutex<Option<String>>,
    level: Arc<Mutex<f32>>,
    muted: Arc<AtomicBool>,
    cleaning_up: AtomicBool,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus, detail: Option<String>) {
        let changed = {
            let mut current = self.status.lock();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed || detail.is_some() {
            let _ = self.status_tx.send(SessionStatusEvent { status, detail });
        }
    }

    fn set_error(&self, message: Option<String>) {
        *self.error.lock() = message;
    }
}

/// Handle to the running driver task for the current session.
struct ActiveSession {
    shutdown_tx: watch::Sender<bool>,
    driver: tokio::task::JoinHandle<()>,
}

/// Top-level handle. `Send + Sync`; wrap in `Arc` to share with observer
/// tasks. The external surface is exactly `connect` / `disconnect` /
/// `toggle_mute` plus observable state.
pub struct SessionController {
    shared: Arc<Shared>,
    activity_tx: broadcast::Sender<AudioLevelEvent>,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    transcript_seq: Arc<AtomicU64>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (transcript_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(ConnectionStatus::Disconnected),
                error: Mutex::new(None),
                level: Arc::new(Mutex::new(0.0)),
                muted: Arc::new(AtomicBool::new(false)),
                cleaning_up: AtomicBool::new(false),
                status_tx,
            }),
            activity_tx,
            transcript_tx,
            transcript_seq: Arc::new(AtomicU64::new(0)),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Open a session. A no-op (returning `Ok`) while already connecting or
    /// connected, and while a previous teardown is still in flight.
    ///
    /// Returns after the transport handshake; the `Connected` status arrives
    /// asynchronously once the service confirms the session.
    ///
    /// # Errors
    /// Any setup failure: the status moves to `Error` with a generic
    /// user-facing detail and everything partially opened is released.
    pub async fn connect(&self, config: SessionConfig) -> Result<()> {
        if !self.connect_allowed() {
            return Ok(());
        }
        let mut slot = self.active.lock().await;
        // Re-check: another caller may have connected while we waited.
        if !self.connect_allowed() {
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            // Leftover handle from a remotely-terminated session; its driver
            // has already finished (the guards above rule out a live one).
            let _ = stale.shutdown_tx.send(true);
            let _ = stale.driver.await;
        }

        self.shared.set_error(None);
        self.shared.set_status(ConnectionStatus::Connecting, None);

        match self.open_session(&config).await {
            Ok(active) => {
                *slot = Some(active);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                let message = user_message(&e).to_string();
                self.shared.set_error(Some(message.clone()));
                self.shared
                    .set_status(ConnectionStatus::Error, Some(message));
                Err(e)
            }
        }
    }

    /// Tear down the current session, whatever state it is in, and land in
    /// `Disconnected`. Safe to call repeatedly and concurrently — callers
    /// serialize on the session slot and teardown runs at most once.
    pub async fn disconnect(&self) {
        let mut slot = self.active.lock().await;
        if let Some(active) = slot.take() {
            let _ = active.shutdown_tx.send(true);
            if active.driver.await.is_err() {
                warn!("session driver panicked during shutdown");
            }
        }
        self.shared.set_error(None);
        *self.shared.level.lock() = 0.0;
        self.shared
            .set_status(ConnectionStatus::Disconnected, None);
    }

    /// Flip the mute flag. Valid in any state; takes effect on the next
    /// capture tick. Returns the new value.
    pub fn toggle_mute(&self) -> bool {
        let was = self.shared.muted.fetch_xor(true, Ordering::SeqCst);
        let now = !was;
        info!(muted = now, "mute toggled");
        now
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.lock()
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    /// Latest normalized input level in [0, 1].
    pub fn volume_level(&self) -> f32 {
        *self.shared.level.lock()
    }

    /// Point-in-time view for rendering.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            is_muted: self.is_muted(),
            volume_level: self.volume_level(),
            error: self.shared.error.lock().clone(),
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioLevelEvent> {
        self.activity_tx.subscribe()
    }

    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn connect_allowed(&self) -> bool {
        if self.shared.cleaning_up.load(Ordering::SeqCst) {
            info!("connect ignored: cleanup in progress");
            return false;
        }
        let status = *self.shared.status.lock();
        if matches!(
            status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            debug!(status = status.as_str(), "connect ignored");
            return false;
        }
        true
    }

    /// Acquire resources in order: output, microphone, transport. On any
    /// failure everything already opened is released before returning.
    async fn open_session(&self, config: &SessionConfig) -> Result<ActiveSession> {
        let mut playback = PlaybackScheduler::open(OUTPUT_SAMPLE_RATE).await?;

        let capture_result = CapturePipeline::start(
            Arc::clone(&self.shared.muted),
            Arc::clone(&self.shared.level),
            self.activity_tx.clone(),
        )
        .await;
        let (capture, frames_rx) = match capture_result {
            Ok(parts) => parts,
            Err(e) => {
                playback.shutdown();
                return Err(e);
            }
        };

        let params = LiveSessionParams {
            model: qualified_model_name(&config.model),
            voice_name: config.voice_name.clone(),
            system_instruction: config.system_prompt.clone(),
            temperature: config.temperature,
            language: config.language.clone(),
        };
        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(transport::DEFAULT_ENDPOINT);
        let (handle, events_rx) =
            match transport::connect(&params, endpoint, &config.api_key).await {
                Ok(parts) => parts,
                Err(e) => {
                    capture.stop();
                    playback.shutdown();
                    *self.shared.level.lock() = 0.0;
                    return Err(e);
                }
            };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = tokio::spawn(run_driver(DriverContext {
            shared: Arc::clone(&self.shared),
            capture,
            playback,
            transport: handle,
            frames_rx,
            events_rx,
            shutdown_rx,
            transcript_tx: self.transcript_tx.clone(),
            transcript_seq: Arc::clone(&self.transcript_seq),
        }));

        Ok(ActiveSession {
            shutdown_tx,
            driver,
        })
    }
}

/// Why a driver loop ended.
enum SessionEnd {
    /// Local `disconnect()`.
    Requested,
    /// Remote close frame or end of stream.
    RemoteClosed,
    /// Transport or capture failure; holds the user-facing message.
    Failed(String),
}

/// The session's resource bundle plus its wiring, moved into the driver.
struct DriverContext {
    shared: Arc<Shared>,
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    transport: LiveHandle,
    frames_rx: mpsc::Receiver<String>,
    events_rx: mpsc::Receiver<ServerEvent>,
    shutdown_rx: watch::Receiver<bool>,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    transcript_seq: Arc<AtomicU64>,
}

/// Single event loop of a session: forwards capture frames to the transport
/// and applies transport events, then tears everything down.
async fn run_driver(mut ctx: DriverContext) {
    let end = loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown_rx.changed() => {
                break SessionEnd::Requested;
            }
            frame = ctx.frames_rx.recv() => match frame {
                Some(payload) => {
                    if let Err(e) = ctx.transport.send_audio(payload).await {
                        warn!(error = %e, "outbound send failed, ending session");
                        break SessionEnd::Failed(MSG_CONNECTION_LOST.into());
                    }
                }
                None => {
                    warn!("capture pipeline stopped unexpectedly");
                    break SessionEnd::Failed(MSG_UNEXPECTED.into());
                }
            },
            event = ctx.events_rx.recv() => match event {
                Some(ServerEvent::Opened) => {
                    info!("session opened");
                    ctx.shared.set_status(ConnectionStatus::Connected, None);
                }
                Some(ServerEvent::Audio(payload)) => {
                    match codec::from_base64(&payload)
                        .and_then(|bytes| codec::decode_pcm16(&bytes))
                    {
                        Ok(samples) => ctx.playback.schedule(&samples),
                        Err(e) => warn!(error = %e, "dropping malformed audio fragment"),
                    }
                }
                Some(ServerEvent::Interrupted) => {
                    debug!("barge-in: flushing scheduled playback");
                    ctx.playback.interrupt();
                }
                Some(ServerEvent::Transcript(text)) => {
                    let seq = ctx.transcript_seq.fetch_add(1, Ordering::Relaxed);
                    let _ = ctx.transcript_tx.send(TranscriptEvent { seq, text });
                }
                Some(ServerEvent::Error(reason)) => {
                    warn!(reason = %reason, "transport error");
                    break SessionEnd::Failed(MSG_SERVICE_ERROR.into());
                }
                Some(ServerEvent::Closed) | None => {
                    info!("remote closed the session");
                    break SessionEnd::RemoteClosed;
                }
            },
        }
    };
    teardown(ctx, end).await;
}

/// The cleanup contract: close transport, stop capture, shut down playback
/// (cursor reset included), zero the level, publish the final status. Every
/// step is best-effort so one failure cannot strand the others.
async fn teardown(mut ctx: DriverContext, end: SessionEnd) {
    ctx.shared.cleaning_up.store(true, Ordering::SeqCst);
    debug!("cleanup starting");

    ctx.transport.close().await;
    ctx.capture.stop();
    ctx.playback.shutdown();
    *ctx.shared.level.lock() = 0.0;

    match end {
        SessionEnd::Requested | SessionEnd::RemoteClosed => {
            ctx.shared.set_error(None);
            ctx.shared
                .set_status(ConnectionStatus::Disconnected, None);
        }
        SessionEnd::Failed(message) => {
            ctx.shared.set_error(Some(message.clone()));
            ctx.shared
                .set_status(ConnectionStatus::Error, Some(message));
        }
    }

    ctx.shared.cleaning_up.store(false, Ordering::SeqCst);
    info!("cleanup complete");
}

/// The setup message wants the fully-qualified resource name; stored
/// configs usually carry the bare model id.
fn qualified_model_name(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Map an internal error to the short, non-technical string shown to users.
fn user_message(error: &ConfabError) -> &'static str {
    match error {
        ConfabError::Microphone(_) => MSG_MICROPHONE,
        ConfabError::AudioDevice(_)
        | ConfabError::AudioStream(_)
        | ConfabError::NoDefaultOutputDevice => MSG_PLAYBACK,
        ConfabError::Transport(_) => MSG_CONNECT_FAILED,
        ConfabError::Decode(_) | ConfabError::Io(_) | ConfabError::Other(_) => MSG_UNEXPECTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    fn test_shared() -> Arc<Shared> {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Arc::new(Shared {
            status: Mutex::new(ConnectionStatus::Connecting),
            error: Mutex::new(None),
            level: Arc::new(Mutex::new(0.5)),
            muted: Arc::new(AtomicBool::new(false)),
            cleaning_up: AtomicBool::new(false),
            status_tx,
        })
    }

    struct DriverHarness {
        shared: Arc<Shared>,
        timeline: Arc<Mutex<crate::playback::Timeline>>,
        frames_tx: mpsc::Sender<String>,
        events_tx: mpsc::Sender<ServerEvent>,
        outbound_rx: mpsc::Receiver<crate::transport::Outbound>,
        shutdown_tx: watch::Sender<bool>,
        driver: tokio::task::JoinHandle<()>,
    }

    fn spawn_driver() -> DriverHarness {
        let shared = test_shared();
        let playback = PlaybackScheduler::detached(24_000, 24_000);
        let timeline = playback.timeline_handle();
        let (frames_tx, frames_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (transcript_tx, _) = broadcast::channel(16);

        let driver = tokio::spawn(run_driver(DriverContext {
            shared: Arc::clone(&shared),
            capture: CapturePipeline::stub(),
            playback,
            transport: LiveHandle::new(outbound_tx),
            frames_rx,
            events_rx,
            shutdown_rx,
            transcript_tx,
            transcript_seq: Arc::new(AtomicU64::new(0)),
        }));

        DriverHarness {
            shared,
            timeline,
            frames_tx,
            events_tx,
            outbound_rx,
            shutdown_tx,
            driver,
        }
    }

    fn audio_payload(samples: &[f32]) -> String {
        codec::to_base64(&codec::encode_pcm16(samples))
    }

    #[tokio::test]
    async fn connect_is_a_no_op_while_connected() {
        let controller = SessionController::new();
        controller
            .shared
            .set_status(ConnectionStatus::Connected, None);

        controller.connect(SessionConfig::default()).await.unwrap();

        assert_eq!(controller.status(), ConnectionStatus::Connected);
        assert!(controller.active.lock().await.is_none());
    }

    #[tokio::test]
    async fn connect_is_a_no_op_while_cleanup_is_in_flight() {
        let controller = SessionController::new();
        controller
            .shared
            .cleaning_up
            .store(true, Ordering::SeqCst);

        controller.connect(SessionConfig::default()).await.unwrap();

        assert_eq!(controller.status(), ConnectionStatus::Disconnected);
        assert!(controller.active.lock().await.is_none());
    }

    #[tokio::test]
    async fn failed_connect_walks_connecting_then_error() {
        let controller = SessionController::new();
        let mut status_rx = controller.subscribe_status();

        let config = SessionConfig {
            endpoint: Some("ws://127.0.0.1:9".into()),
            ..SessionConfig::default()
        };
        let result = controller.connect(config).await;
        assert!(result.is_err());

        let first = status_rx.recv().await.unwrap();
        assert_eq!(first.status, ConnectionStatus::Connecting);
        let second = status_rx.recv().await.unwrap();
        assert_eq!(second.status, ConnectionStatus::Error);
        assert!(second.detail.is_some());

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert!(snapshot.error.is_some());
        // No session half-open anywhere
        assert!(controller.active.lock().await.is_none());

        // Manual retry path: disconnect lands back in Disconnected
        controller.disconnect().await;
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);
        assert!(controller.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_including_concurrent_calls() {
        let controller = Arc::new(SessionController::new());

        controller.disconnect().await;
        controller.disconnect().await;
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);

        let a = Arc::clone(&controller);
        let b = Arc::clone(&controller);
        tokio::join!(a.disconnect(), b.disconnect());
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);
        assert_eq!(controller.volume_level(), 0.0);
    }

    #[test]
    fn model_names_are_qualified_once() {
        assert_eq!(qualified_model_name("gemini-x"), "models/gemini-x");
        assert_eq!(qualified_model_name("models/gemini-x"), "models/gemini-x");
    }

    #[tokio::test]
    async fn toggle_mute_works_in_any_state() {
        let controller = SessionController::new();
        assert!(!controller.is_muted());
        assert!(controller.toggle_mute());
        assert!(controller.is_muted());
        assert!(!controller.toggle_mute());
        assert!(!controller.is_muted());
    }

    #[tokio::test]
    async fn driver_connects_schedules_and_interrupts() {
        let harness = spawn_driver();

        harness.events_tx.send(ServerEvent::Opened).await.unwrap();
        let shared = Arc::clone(&harness.shared);
        wait_until(move || *shared.status.lock() == ConnectionStatus::Connected).await;

        harness
            .events_tx
            .send(ServerEvent::Audio(audio_payload(&[0.1; 480])))
            .await
            .unwrap();
        let timeline = Arc::clone(&harness.timeline);
        wait_until(move || timeline.lock().active_count() == 1).await;
        assert!(harness.timeline.lock().cursor_secs() > 0.0);

        harness
            .events_tx
            .send(ServerEvent::Interrupted)
            .await
            .unwrap();
        let timeline = Arc::clone(&harness.timeline);
        wait_until(move || timeline.lock().active_count() == 0).await;
        assert_eq!(harness.timeline.lock().cursor_secs(), 0.0);

        harness.shutdown_tx.send(true).unwrap();
        harness.driver.await.unwrap();
        assert_eq!(
            *harness.shared.status.lock(),
            ConnectionStatus::Disconnected
        );
        assert_eq!(*harness.shared.level.lock(), 0.0);
        assert!(!harness.shared.cleaning_up.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn driver_forwards_frames_to_transport_in_order() {
        let mut harness = spawn_driver();

        harness.frames_tx.send("first".into()).await.unwrap();
        harness.frames_tx.send("second".into()).await.unwrap();

        for expected in ["first", "second"] {
            match harness.outbound_rx.recv().await.unwrap() {
                crate::transport::Outbound::Audio(payload) => assert_eq!(payload, expected),
                crate::transport::Outbound::Close => panic!("unexpected close"),
            }
        }

        harness.shutdown_tx.send(true).unwrap();
        harness.driver.await.unwrap();
    }

    #[tokio::test]
    async fn driver_drops_malformed_fragments_without_ending_the_session() {
        let harness = spawn_driver();

        harness.events_tx.send(ServerEvent::Opened).await.unwrap();
        // Three bytes of PCM: odd length, decode must fail
        harness
            .events_tx
            .send(ServerEvent::Audio(codec::to_base64(&[1u8, 2, 3])))
            .await
            .unwrap();
        // A healthy fragment right after still schedules
        harness
            .events_tx
            .send(ServerEvent::Audio(audio_payload(&[0.2; 240])))
            .await
            .unwrap();

        let timeline = Arc::clone(&harness.timeline);
        wait_until(move || timeline.lock().active_count() == 1).await;
        assert!(!harness.driver.is_finished());

        harness.shutdown_tx.send(true).unwrap();
        harness.driver.await.unwrap();
    }

    #[tokio::test]
    async fn driver_maps_transport_error_to_error_state() {
        let harness = spawn_driver();

        harness
            .events_tx
            .send(ServerEvent::Error("boom".into()))
            .await
            .unwrap();
        harness.driver.await.unwrap();

        assert_eq!(*harness.shared.status.lock(), ConnectionStatus::Error);
        assert!(harness.shared.error.lock().is_some());
        assert!(!harness.shared.cleaning_up.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn driver_treats_remote_close_as_clean_disconnect() {
        let harness = spawn_driver();

        harness.events_tx.send(ServerEvent::Closed).await.unwrap();
        harness.driver.await.unwrap();

        assert_eq!(
            *harness.shared.status.lock(),
            ConnectionStatus::Disconnected
        );
        assert!(harness.shared.error.lock().is_none());
    }
}
