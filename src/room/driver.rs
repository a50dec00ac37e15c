use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::{Membership, SessionEngine};
use super::service::{RoomInfo, RoomService};
use super::state::{Room, RoomSnapshot};
use super::types::{Participant, RoomId, Track, TrackKind};
use crate::devices::{DeviceInventory, MediaAcquirer};
use crate::error::{DeviceAcquisitionError, SessionError, SessionResult};
use crate::recording::{
    MediaSource, Recorder, RecorderState, RecordingCoordinator, RecordingStarted, RecordingStatus,
    RecordingSummary,
};
use crate::signaling::{ConnectionState, ControlChannel, SignalingChannel, SignalingMessage};
use crate::voice::{SpectrumFrame, VoiceActivityConfig, VoiceActivityMonitor};

const EVENT_QUEUE_CAPACITY: usize = 256;
const UPDATE_CHANNEL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<SessionResult<T>>;

/// Everything that flows through the session's single event queue.
///
/// Producers (signaling reader, device registry, voice monitor, timers,
/// command handles) only enqueue; the driver task is the sole consumer, so
/// state folds never race each other.
enum SessionEvent {
    Signaling(SignalingMessage),
    Connection(ConnectionState),
    DevicesChanged(DeviceInventory),
    LocalSpeaking(bool),
    RecordingTick,
    AcquisitionDone {
        kind: TrackKind,
        result: Result<Track, DeviceAcquisitionError>,
        reply: Reply<()>,
    },
    Command(SessionCommand),
}

enum SessionCommand {
    Snapshot {
        reply: Reply<RoomSnapshot>,
    },
    RoomInfo {
        reply: Reply<RoomInfo>,
    },
    RecordingStatus {
        reply: oneshot::Sender<RecordingStatus>,
    },
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
        reply: Reply<()>,
    },
    ReplaceTrack {
        kind: TrackKind,
        device_id: Option<String>,
        reply: Reply<()>,
    },
    StartRecording {
        reply: Reply<RecordingStarted>,
    },
    StopRecording {
        reply: Reply<RecordingSummary>,
    },
    Leave {
        reply: Reply<()>,
    },
}

/// State-change notification published to observers. Collaborators outside
/// the core subscribe instead of mutating state directly.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Room(RoomSnapshot),
    Recording(RecordingStatus),
    Devices(DeviceInventory),
    Connection(ConnectionState),
    Left,
}

/// Cloneable command surface for one room membership.
///
/// All methods enqueue onto the session event queue and await the driver's
/// reply, so callers from any task observe the same serialized state.
#[derive(Clone)]
pub struct SessionHandle {
    events_tx: mpsc::Sender<SessionEvent>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    voice_gate: watch::Receiver<bool>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates_tx.subscribe()
    }

    /// Whether the local audio track is currently live. The voice monitor
    /// samples only while this is true.
    pub fn voice_gate(&self) -> watch::Receiver<bool> {
        self.voice_gate.clone()
    }

    pub async fn snapshot(&self) -> SessionResult<RoomSnapshot> {
        self.command(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Room metadata as reported by the room backend.
    pub async fn room_info(&self) -> SessionResult<RoomInfo> {
        self.command(|reply| SessionCommand::RoomInfo { reply }).await
    }

    pub async fn recording_status(&self) -> SessionResult<RecordingStatus> {
        let (reply, rx) = oneshot::channel();
        self.events_tx
            .send(SessionEvent::Command(SessionCommand::RecordingStatus {
                reply,
            }))
            .await
            .map_err(|_| session_ended())?;
        rx.await.map_err(|_| session_ended())
    }

    pub async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> SessionResult<()> {
        self.command(|reply| SessionCommand::SetTrackEnabled {
            kind,
            enabled,
            reply,
        })
        .await
    }

    /// Acquire a new capture source for `kind` and hot-swap it onto the
    /// local participant. The previous enabled state survives the swap.
    pub async fn replace_track(
        &self,
        kind: TrackKind,
        device_id: Option<String>,
    ) -> SessionResult<()> {
        self.command(|reply| SessionCommand::ReplaceTrack {
            kind,
            device_id,
            reply,
        })
        .await
    }

    pub async fn start_recording(&self) -> SessionResult<RecordingStarted> {
        self.command(|reply| SessionCommand::StartRecording { reply })
            .await
    }

    pub async fn stop_recording(&self) -> SessionResult<RecordingSummary> {
        self.command(|reply| SessionCommand::StopRecording { reply })
            .await
    }

    /// Leave the room. Best-effort teardown: recording is stopped, pending
    /// acquisitions discarded, the channel closed, then state dropped.
    pub async fn leave(&self) -> SessionResult<()> {
        self.command(|reply| SessionCommand::Leave { reply }).await
    }

    /// Producer entry point for the voice monitor.
    pub async fn notify_speaking(&self, speaking: bool) {
        let _ = self
            .events_tx
            .send(SessionEvent::LocalSpeaking(speaking))
            .await;
    }

    /// Producer entry point for the device registry.
    pub async fn notify_devices(&self, inventory: DeviceInventory) {
        let _ = self
            .events_tx
            .send(SessionEvent::DevicesChanged(inventory))
            .await;
    }

    async fn command<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.events_tx
            .send(SessionEvent::Command(build(reply)))
            .await
            .map_err(|_| session_ended())?;
        rx.await.map_err(|_| session_ended())?
    }
}

fn session_ended() -> SessionError {
    SessionError::InvalidOperation("session has ended".to_string())
}

/// External collaborators the driver needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub room_service: Arc<dyn RoomService>,
    pub recorder: Arc<dyn Recorder>,
    pub acquirer: Arc<dyn MediaAcquirer>,
    pub signaling_url: String,
    pub subject_prefix: String,
    pub voice: VoiceActivityConfig,
}

/// Parameters for joining (or creating) a room.
pub struct JoinRequest {
    /// Join this room, or create a fresh one when absent.
    pub room_id: Option<RoomId>,
    /// Room name used on create.
    pub room_name: String,
    pub display_name: String,
}

/// Join a room end to end: backend handshake, signaling connect, local
/// participant announcement, driver spawn.
pub async fn join(deps: SessionDeps, request: JoinRequest) -> SessionResult<SessionHandle> {
    let mut engine = SessionEngine::new();
    engine.begin_join()?;

    let is_host = request.room_id.is_none();
    let credentials = match &request.room_id {
        Some(room_id) => deps.room_service.join_room(room_id).await,
        None => deps.room_service.create_room(&request.room_name).await,
    };
    let credentials = match credentials {
        Ok(credentials) => credentials,
        Err(e) => {
            engine.fail_join();
            return Err(e);
        }
    };

    let connected = SignalingChannel::connect(
        &deps.signaling_url,
        &deps.subject_prefix,
        credentials.room_id.as_str(),
    )
    .await;
    let (channel, signaling_rx) = match connected {
        Ok(pair) => pair,
        Err(e) => {
            engine.fail_join();
            return Err(SessionError::Transport(e.to_string()));
        }
    };

    let wire_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    let mut local = Participant::local(&request.display_name, is_host);
    local.session_id = Some(session_id.clone());

    let room = Room::new(
        credentials.room_id.clone(),
        &credentials.room_name,
        local,
        &wire_id,
    );
    engine.complete_join(room)?;

    info!(
        "Joined room {} as {} (host: {})",
        credentials.room_id, request.display_name, is_host
    );

    let announce = SignalingMessage::SessionAnnounce {
        participant_id: wire_id,
        participant_name: request.display_name,
        session_id,
        tracks: Vec::new(),
    };
    if let Err(e) = channel.send(&announce).await {
        warn!("Failed to announce local participant: {}", e);
    }

    let token = credentials.token;
    Ok(SessionDriver::spawn(
        engine,
        Box::new(channel),
        signaling_rx,
        deps,
        token,
    ))
}

/// The single consumer of the session event queue.
///
/// Owns the room aggregate and the recording coordinator; every mutation
/// of either happens inside `run`, one event at a time.
pub struct SessionDriver {
    engine: SessionEngine,
    channel: Option<Box<dyn ControlChannel>>,
    coordinator: RecordingCoordinator,
    acquirer: Arc<dyn MediaAcquirer>,
    room_service: Arc<dyn RoomService>,
    token: String,
    events_rx: mpsc::Receiver<SessionEvent>,
    events_tx: mpsc::Sender<SessionEvent>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    gate_tx: watch::Sender<bool>,
    ticker: Option<JoinHandle<()>>,
    voice_config: VoiceActivityConfig,
    voice_task: Option<JoinHandle<()>>,
    voice_shutdown: Option<watch::Sender<bool>>,
    pending_acquisitions: usize,
}

impl SessionDriver {
    /// Spawn the driver for an already-active membership and return its
    /// command handle. Exposed so embedders and tests can wire their own
    /// channel and collaborator implementations.
    pub fn spawn(
        engine: SessionEngine,
        channel: Box<dyn ControlChannel>,
        mut signaling_rx: mpsc::Receiver<SignalingMessage>,
        deps: SessionDeps,
        token: String,
    ) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let initial_gate = engine
            .room()
            .and_then(|room| room.self_participant().track(TrackKind::Audio))
            .map(|track| track.enabled)
            .unwrap_or(false);
        let (gate_tx, gate_rx) = watch::channel(initial_gate);

        let signaling_events = events_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = signaling_rx.recv().await {
                if signaling_events
                    .send(SessionEvent::Signaling(message))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let connection_events = events_tx.clone();
        let mut state_rx = channel.state();
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow();
                if connection_events
                    .send(SessionEvent::Connection(state))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let handle = SessionHandle {
            events_tx: events_tx.clone(),
            updates_tx: updates_tx.clone(),
            voice_gate: gate_rx,
        };

        let driver = Self {
            engine,
            channel: Some(channel),
            coordinator: RecordingCoordinator::new(deps.recorder),
            acquirer: deps.acquirer,
            room_service: deps.room_service,
            token,
            events_rx,
            events_tx,
            updates_tx,
            gate_tx,
            ticker: None,
            voice_config: deps.voice,
            voice_task: None,
            voice_shutdown: None,
            pending_acquisitions: 0,
        };
        tokio::spawn(driver.run());

        handle
    }

    async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;

            if self.engine.membership() == Membership::Left && self.pending_acquisitions == 0 {
                break;
            }
        }
        debug!("Session driver stopped");
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Signaling(message) => self.handle_signaling(message).await,

            SessionEvent::Connection(state) => {
                let _ = self.updates_tx.send(SessionUpdate::Connection(state));
                if matches!(state, ConnectionState::Closed | ConnectionState::Failed)
                    && self.engine.membership() == Membership::Active
                {
                    warn!("Signaling channel went down ({:?}), tearing room down", state);
                    if let Err(e) = self.teardown(false).await {
                        warn!("Teardown after channel loss failed: {}", e);
                    }
                }
            }

            SessionEvent::DevicesChanged(inventory) => {
                info!(
                    "Device set changed: {} audio in, {} audio out, {} video in",
                    inventory.audio_inputs.len(),
                    inventory.audio_outputs.len(),
                    inventory.video_inputs.len()
                );
                let _ = self.updates_tx.send(SessionUpdate::Devices(inventory));
            }

            SessionEvent::LocalSpeaking(speaking) => {
                let Ok(room) = self.engine.active_room_mut() else {
                    return;
                };
                if let Some(outgoing) = room.set_local_speaking(speaking) {
                    self.send_signal(&outgoing).await;
                    self.broadcast_room();
                }
            }

            SessionEvent::RecordingTick => {
                self.coordinator.tick();
                let _ = self
                    .updates_tx
                    .send(SessionUpdate::Recording(self.coordinator.status()));
            }

            SessionEvent::AcquisitionDone {
                kind,
                result,
                reply,
            } => {
                self.pending_acquisitions -= 1;
                let outcome = self.finish_replace(kind, result).await;
                let _ = reply.send(outcome);
            }

            SessionEvent::Command(command) => self.handle_command(command).await,
        }
    }

    async fn handle_signaling(&mut self, message: SignalingMessage) {
        let departed = match &message {
            SignalingMessage::ParticipantLeft { participant_id } => Some(participant_id.clone()),
            SignalingMessage::Leave { from } => Some(from.clone()),
            _ => None,
        };

        if !self.engine.apply_remote(&message) {
            return;
        }

        // Removal cascades into the recording coordinator.
        if let Some(participant_id) = departed {
            self.coordinator.on_participant_left(&participant_id).await;
            let _ = self
                .updates_tx
                .send(SessionUpdate::Recording(self.coordinator.status()));
        }

        self.broadcast_room();
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Snapshot { reply } => {
                let result = self
                    .engine
                    .room()
                    .map(|room| room.snapshot())
                    .ok_or_else(|| {
                        SessionError::InvalidOperation("no active room".to_string())
                    });
                let _ = reply.send(result);
            }

            SessionCommand::RoomInfo { reply } => {
                let result = match self.engine.room() {
                    Some(room) => {
                        let room_id = room.id.clone();
                        self.room_service.room_info(&room_id, &self.token).await
                    }
                    None => Err(SessionError::InvalidOperation(
                        "no active room".to_string(),
                    )),
                };
                let _ = reply.send(result);
            }

            SessionCommand::RecordingStatus { reply } => {
                let _ = reply.send(self.coordinator.status());
            }

            SessionCommand::SetTrackEnabled {
                kind,
                enabled,
                reply,
            } => {
                let result = self.set_track_enabled(kind, enabled).await;
                let _ = reply.send(result);
            }

            SessionCommand::ReplaceTrack {
                kind,
                device_id,
                reply,
            } => {
                if self.engine.membership() != Membership::Active {
                    let _ = reply.send(Err(SessionError::InvalidOperation(
                        "no active room".to_string(),
                    )));
                    return;
                }

                // Acquisition is a cancellable suspension point: it runs off
                // the queue and its result is folded back in as an event, so
                // a slow device switch never stalls the session and a
                // torn-down room discards the result.
                self.pending_acquisitions += 1;
                let acquirer = Arc::clone(&self.acquirer);
                let events_tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = acquirer.acquire(kind, device_id.as_deref()).await;
                    let _ = events_tx
                        .send(SessionEvent::AcquisitionDone {
                            kind,
                            result,
                            reply,
                        })
                        .await;
                });
            }

            SessionCommand::StartRecording { reply } => {
                let result = self.start_recording().await;
                let _ = reply.send(result);
            }

            SessionCommand::StopRecording { reply } => {
                // Stop ticking first so the counter cannot drift past the
                // stop instant while recorders close.
                self.stop_ticker();
                let result = self.coordinator.stop_session().await;
                let _ = self
                    .updates_tx
                    .send(SessionUpdate::Recording(self.coordinator.status()));
                let _ = reply.send(result);
            }

            SessionCommand::Leave { reply } => {
                let result = self.teardown(true).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> SessionResult<()> {
        let room = self.engine.active_room_mut()?;
        let outgoing = room.set_local_track_enabled(kind, enabled);

        if kind == TrackKind::Audio {
            self.gate_tx.send_replace(enabled);
        }

        self.broadcast_room();
        self.send_signal(&outgoing).await;
        Ok(())
    }

    async fn finish_replace(
        &mut self,
        kind: TrackKind,
        result: Result<Track, DeviceAcquisitionError>,
    ) -> SessionResult<()> {
        let track = result.map_err(SessionError::DeviceAcquisition)?;

        if self.engine.membership() != Membership::Active {
            // The room went away while the acquisition was in flight:
            // release the handle instead of attaching it to stale state.
            info!("Discarding acquisition completed after room teardown");
            self.acquirer.release(track).await;
            return Err(SessionError::InvalidOperation(
                "room was torn down during device acquisition".to_string(),
            ));
        }

        let acquired = track.clone();
        let room = self.engine.active_room_mut()?;
        let replaced = room.replace_local_track(kind, track)?;

        if kind == TrackKind::Audio {
            let live = room
                .self_participant()
                .track(TrackKind::Audio)
                .map(|t| t.enabled)
                .unwrap_or(false);
            self.gate_tx.send_replace(live);
        }

        // The new track is live; only now release the old handle so the
        // stream never gaps. On explicit disable the track stays in place
        // and release is immediate on the collaborator side.
        if let Some(old) = replaced {
            self.acquirer.release(old).await;
        }

        // Re-point the voice monitor at the new audio source. The previous
        // monitor is torn down first so it can never report stale state.
        if kind == TrackKind::Audio {
            self.stop_voice_monitor();
            if let Some(frames) = self.acquirer.spectrum(&acquired).await {
                self.start_voice_monitor(frames);
            }
        }

        self.broadcast_room();
        Ok(())
    }

    fn start_voice_monitor(&mut self, frames: mpsc::Receiver<SpectrumFrame>) {
        let monitor = VoiceActivityMonitor::new(self.voice_config.clone());
        let gate = self.gate_tx.subscribe();
        let (speaking_tx, mut speaking_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(speaking) = speaking_rx.recv().await {
                if events_tx
                    .send(SessionEvent::LocalSpeaking(speaking))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        self.voice_shutdown = Some(shutdown_tx);
        self.voice_task = Some(tokio::spawn(monitor.run(
            frames,
            gate,
            speaking_tx,
            shutdown_rx,
        )));
    }

    fn stop_voice_monitor(&mut self) {
        if let Some(shutdown) = self.voice_shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.voice_task.take() {
            task.abort();
        }
    }

    async fn start_recording(&mut self) -> SessionResult<RecordingStarted> {
        let room = self.engine.active_room_mut()?;

        if !room.self_participant().is_host {
            return Err(SessionError::InvalidOperation(
                "only the host can start a recording session".to_string(),
            ));
        }

        let mut sources = Vec::new();
        for participant in room.participants() {
            match MediaSource::for_participant(participant) {
                Some(source) => sources.push(source),
                None => warn!(
                    "Participant {} has no resolvable media source, skipping",
                    participant.id
                ),
            }
        }

        let started = self.coordinator.start_session(sources).await?;
        self.start_ticker();
        let _ = self
            .updates_tx
            .send(SessionUpdate::Recording(self.coordinator.status()));
        Ok(started)
    }

    /// Tear the membership down. Order matters: stop recording so media is
    /// flushed, discard pending acquisitions, close the channel, then drop
    /// state.
    async fn teardown(&mut self, send_leave: bool) -> SessionResult<()> {
        self.engine.begin_leave()?;

        if self.coordinator.state() == RecorderState::Recording {
            self.stop_ticker();
            match self.coordinator.stop_session().await {
                Ok(summary) => info!(
                    "Recording stopped on leave after {}s",
                    summary.duration_seconds
                ),
                Err(e) => warn!("Failed to stop recording on leave: {}", e),
            }
            let _ = self
                .updates_tx
                .send(SessionUpdate::Recording(self.coordinator.status()));
        }

        if self.pending_acquisitions > 0 {
            info!(
                "Discarding {} in-flight device acquisition(s)",
                self.pending_acquisitions
            );
        }
        self.stop_voice_monitor();
        self.gate_tx.send_replace(false);

        let wire_id = self.engine.room().map(|r| r.local_wire_id().to_string());
        let room_id = self.engine.room().map(|r| r.id.clone());

        if let Some(channel) = self.channel.take() {
            if send_leave {
                if let Some(from) = wire_id {
                    // Best-effort: cleanup proceeds even when the final
                    // notification cannot be delivered.
                    if let Err(e) = channel.send(&SignalingMessage::Leave { from }).await {
                        warn!("Failed to deliver leave notification: {}", e);
                    }
                }
            }
            channel.close().await;
        }

        if let Some(room_id) = room_id {
            if let Err(e) = self.room_service.leave_room(&room_id, &self.token).await {
                warn!("Room backend leave failed: {}", e);
            }
        }

        self.engine.complete_leave();
        let _ = self.updates_tx.send(SessionUpdate::Left);
        info!("Left room");
        Ok(())
    }

    fn start_ticker(&mut self) {
        let events_tx = self.events_tx.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick fires immediately; skip it so second one lands
            // a full period after start.
            interval.tick().await;
            loop {
                interval.tick().await;
                if events_tx.send(SessionEvent::RecordingTick).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn broadcast_room(&self) {
        if let Some(room) = self.engine.room() {
            let _ = self.updates_tx.send(SessionUpdate::Room(room.snapshot()));
        }
    }

    async fn send_signal(&self, message: &SignalingMessage) {
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.send(message).await {
                warn!("Failed to send signaling message: {}", e);
            }
        }
    }
}
