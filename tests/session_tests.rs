// End-to-end scenarios for the session driver: the single event queue,
// membership teardown, recording orchestration, and local track control,
// all exercised through in-memory collaborator doubles.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

use greenroom::{
    ConnectionState, ControlChannel, DeviceAcquisitionError, MediaAcquirer, MediaSource,
    Participant, ParticipantSnapshot, Recorder, RecorderError, RecorderHandle, Room,
    RoomCredentials, RoomId, RoomInfo, RoomService, RoomSnapshot, SessionDeps, SessionDriver,
    SessionEngine, SessionError, SessionHandle, SessionResult, SessionUpdate, SignalingMessage,
    Track, TrackKind, VoiceActivityConfig,
};

// ============================================================================
// Collaborator doubles
// ============================================================================

struct LoopbackChannel {
    sent: Arc<Mutex<Vec<SignalingMessage>>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl LoopbackChannel {
    fn new() -> (Self, Arc<Mutex<Vec<SignalingMessage>>>, watch::Sender<ConnectionState>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (state_tx, _) = watch::channel(ConnectionState::Open);
        (
            Self {
                sent: Arc::clone(&sent),
                state_tx: state_tx.clone(),
            },
            sent,
            state_tx,
        )
    }
}

#[async_trait]
impl ControlChannel for LoopbackChannel {
    async fn send(&self, message: &SignalingMessage) -> SessionResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn close(self: Box<Self>) {
        self.state_tx.send_replace(ConnectionState::Closed);
    }
}

#[derive(Default)]
struct FakeRoomService {
    left: Mutex<Vec<String>>,
}

#[async_trait]
impl RoomService for FakeRoomService {
    async fn create_room(&self, room_name: &str) -> SessionResult<RoomCredentials> {
        Ok(RoomCredentials {
            room_id: RoomId::parse("ABC123").unwrap(),
            room_name: room_name.to_string(),
            token: "token".to_string(),
            issued_at: chrono::Utc::now(),
        })
    }

    async fn join_room(&self, room_id: &RoomId) -> SessionResult<RoomCredentials> {
        Ok(RoomCredentials {
            room_id: room_id.clone(),
            room_name: "Test Room".to_string(),
            token: "token".to_string(),
            issued_at: chrono::Utc::now(),
        })
    }

    async fn room_info(&self, room_id: &RoomId, _token: &str) -> SessionResult<RoomInfo> {
        Ok(RoomInfo {
            id: room_id.clone(),
            name: "Standup".to_string(),
            host_id: "host".to_string(),
            participant_count: 1,
            created_at: chrono::Utc::now(),
            ttl_seconds: 3600,
        })
    }

    async fn leave_room(&self, room_id: &RoomId, _token: &str) -> SessionResult<()> {
        self.left.lock().unwrap().push(room_id.to_string());
        Ok(())
    }
}

struct FakeRecorder {
    fail_open: HashSet<String>,
    open: Mutex<HashSet<String>>,
}

impl FakeRecorder {
    fn new(fail_open: &[&str]) -> Self {
        Self {
            fail_open: fail_open.iter().map(|s| s.to_string()).collect(),
            open: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn start_recording(
        &self,
        participant_id: &str,
        _source: &MediaSource,
    ) -> Result<RecorderHandle, RecorderError> {
        if self.fail_open.contains(participant_id) {
            return Err(RecorderError::Open("no media".to_string()));
        }
        self.open.lock().unwrap().insert(participant_id.to_string());
        Ok(RecorderHandle::new())
    }

    async fn stop_recording(&self, participant_id: &str) -> Result<(), RecorderError> {
        self.open.lock().unwrap().remove(participant_id);
        Ok(())
    }
}

struct FakeAcquirer {
    names: Mutex<VecDeque<String>>,
    released: Mutex<Vec<String>>,
}

impl FakeAcquirer {
    fn new(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|s| s.to_string()).collect()),
            released: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaAcquirer for FakeAcquirer {
    async fn acquire(
        &self,
        kind: TrackKind,
        _device_id: Option<&str>,
    ) -> Result<Track, DeviceAcquisitionError> {
        let name = self
            .names
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DeviceAcquisitionError::NotFound("out of devices".to_string()))?;
        Ok(Track::new(name, kind))
    }

    async fn release(&self, track: Track) {
        self.released.lock().unwrap().push(track.name);
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Session {
    handle: SessionHandle,
    signaling_tx: mpsc::Sender<SignalingMessage>,
    sent: Arc<Mutex<Vec<SignalingMessage>>>,
    state_tx: watch::Sender<ConnectionState>,
    room_service: Arc<FakeRoomService>,
    recorder: Arc<FakeRecorder>,
    acquirer: Arc<FakeAcquirer>,
}

fn spawn_session(is_host: bool, fail_open: &[&str], device_names: &[&str]) -> Session {
    let mut engine = SessionEngine::new();
    engine.begin_join().unwrap();

    let mut local = Participant::local("Host", is_host);
    local.session_id = Some("sess-self".to_string());
    let room = Room::new(
        RoomId::parse("ABC123").unwrap(),
        "Standup",
        local,
        "wire-self",
    );
    engine.complete_join(room).unwrap();

    let (channel, sent, state_tx) = LoopbackChannel::new();
    let (signaling_tx, signaling_rx) = mpsc::channel(64);

    let room_service = Arc::new(FakeRoomService::default());
    let recorder = Arc::new(FakeRecorder::new(fail_open));
    let acquirer = Arc::new(FakeAcquirer::new(device_names));

    let deps = SessionDeps {
        room_service: Arc::clone(&room_service) as Arc<dyn RoomService>,
        recorder: Arc::clone(&recorder) as Arc<dyn Recorder>,
        acquirer: Arc::clone(&acquirer) as Arc<dyn MediaAcquirer>,
        signaling_url: "nats://unused".to_string(),
        subject_prefix: "room".to_string(),
        voice: VoiceActivityConfig::default(),
    };

    let handle = SessionDriver::spawn(
        engine,
        Box::new(channel),
        signaling_rx,
        deps,
        "token".to_string(),
    );

    Session {
        handle,
        signaling_tx,
        sent,
        state_tx,
        room_service,
        recorder,
        acquirer,
    }
}

fn announce(id: &str) -> SignalingMessage {
    SignalingMessage::SessionAnnounce {
        participant_id: id.to_string(),
        participant_name: format!("name-{}", id),
        session_id: format!("sess-{}", id),
        tracks: vec![],
    }
}

async fn next_room_update(rx: &mut broadcast::Receiver<SessionUpdate>) -> RoomSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await.unwrap() {
                SessionUpdate::Room(snapshot) => return snapshot,
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for a room update")
}

async fn wait_for_left(rx: &mut broadcast::Receiver<SessionUpdate>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if matches!(rx.recv().await.unwrap(), SessionUpdate::Left) {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for teardown");
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn existing_participants_snapshot_preserves_join_order() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session
        .signaling_tx
        .send(SignalingMessage::ExistingParticipants {
            participants: vec![
                ParticipantSnapshot {
                    participant_id: "p1".to_string(),
                    participant_name: "Ada".to_string(),
                    session_id: "s1".to_string(),
                    tracks: vec![],
                },
                ParticipantSnapshot {
                    participant_id: "p2".to_string(),
                    participant_name: "Grace".to_string(),
                    session_id: "s2".to_string(),
                    tracks: vec![],
                },
            ],
        })
        .await
        .unwrap();

    let snapshot = next_room_update(&mut updates).await;
    let ids: Vec<&str> = snapshot
        .participants
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, vec!["self", "p1", "p2"]);
}

#[tokio::test]
async fn track_state_before_join_is_a_noop() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session
        .signaling_tx
        .send(SignalingMessage::TrackState {
            participant_id: "p2".to_string(),
            kind: TrackKind::Audio,
            enabled: false,
        })
        .await
        .unwrap();

    // A follow-up announce proves the earlier no-op produced no update and
    // created no participant.
    session.signaling_tx.send(announce("p1")).await.unwrap();

    let snapshot = next_room_update(&mut updates).await;
    assert_eq!(snapshot.participants.len(), 2);
    assert!(snapshot.participants.iter().all(|p| p.id != "p2"));
}

#[tokio::test]
async fn duplicate_announce_folds_once() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session.signaling_tx.send(announce("p1")).await.unwrap();
    session.signaling_tx.send(announce("p1")).await.unwrap();
    session.signaling_tx.send(announce("p2")).await.unwrap();

    let first = next_room_update(&mut updates).await;
    assert_eq!(first.participants.len(), 2);

    // Second update comes from p2, not the duplicate p1.
    let second = next_room_update(&mut updates).await;
    assert_eq!(second.participants.len(), 3);
}

#[tokio::test]
async fn room_info_is_fetched_through_the_backend() {
    let session = spawn_session(true, &[], &[]);

    let info = session.handle.room_info().await.unwrap();
    assert_eq!(info.id.as_str(), "ABC123");
    assert_eq!(info.ttl_seconds, 3600);
}

#[tokio::test]
async fn start_recording_requires_host_role() {
    let session = spawn_session(false, &[], &[]);

    let err = session.handle.start_recording().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidOperation(_)));
}

#[tokio::test]
async fn partial_recorder_failure_degrades_session() {
    let session = spawn_session(true, &["p2"], &[]);
    let mut updates = session.handle.subscribe();

    session.signaling_tx.send(announce("p1")).await.unwrap();
    session.signaling_tx.send(announce("p2")).await.unwrap();
    next_room_update(&mut updates).await;
    next_room_update(&mut updates).await;

    let started = session.handle.start_recording().await.unwrap();

    assert!(started.is_degraded());
    assert_eq!(started.active_participants, vec!["self", "p1"]);
    assert_eq!(started.failures.len(), 1);
    assert_eq!(started.failures[0].participant_id, "p2");

    let status = session.handle.recording_status().await.unwrap();
    assert!(status.is_active);
}

#[tokio::test]
async fn participant_departure_closes_their_recorder_only() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session.signaling_tx.send(announce("p1")).await.unwrap();
    next_room_update(&mut updates).await;

    session.handle.start_recording().await.unwrap();
    assert!(session.recorder.open.lock().unwrap().contains("p1"));

    session
        .signaling_tx
        .send(SignalingMessage::ParticipantLeft {
            participant_id: "p1".to_string(),
        })
        .await
        .unwrap();
    next_room_update(&mut updates).await;

    let status = session.handle.recording_status().await.unwrap();
    assert!(status.is_active, "session survives a departure");
    assert_eq!(status.active_participants, vec!["self"]);
    assert!(!session.recorder.open.lock().unwrap().contains("p1"));
    assert!(session.recorder.open.lock().unwrap().contains("self"));
}

#[tokio::test(start_paused = true)]
async fn stop_returns_duration_within_tick_granularity() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session.handle.start_recording().await.unwrap();

    // Wait until three 1-second ticks have been folded in.
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Ok(SessionUpdate::Recording(status)) = updates.recv().await {
                if status.elapsed_seconds >= 3 {
                    return;
                }
            }
        }
    })
    .await
    .expect("ticks never arrived");

    let summary = session.handle.stop_recording().await.unwrap();
    assert_eq!(summary.duration_seconds, 3);
    assert_eq!(summary.participants, vec!["self"]);

    // Stopping again is a caller error.
    assert!(matches!(
        session.handle.stop_recording().await.unwrap_err(),
        SessionError::InvalidOperation(_)
    ));
}

#[tokio::test]
async fn replace_track_preserves_mute_and_releases_old_handle() {
    let session = spawn_session(true, &[], &["mic-0", "mic-1"]);

    session
        .handle
        .replace_track(TrackKind::Audio, None)
        .await
        .unwrap();
    session
        .handle
        .set_track_enabled(TrackKind::Audio, false)
        .await
        .unwrap();

    session
        .handle
        .replace_track(TrackKind::Audio, Some("usb-mic".to_string()))
        .await
        .unwrap();

    let snapshot = session.handle.snapshot().await.unwrap();
    let local = &snapshot.participants[0];
    assert!(local.is_muted);
    let track = local.tracks.iter().find(|t| t.kind == TrackKind::Audio).unwrap();
    assert_eq!(track.name, "mic-1");
    assert!(!track.enabled, "hot-swap must not silently unmute");

    // First handle released only after the second was live.
    assert_eq!(*session.acquirer.released.lock().unwrap(), vec!["mic-0"]);
    assert!(!*session.handle.voice_gate().borrow());
}

#[tokio::test]
async fn failed_acquisition_leaves_prior_track_untouched() {
    let session = spawn_session(true, &[], &["mic-0"]);

    session
        .handle
        .replace_track(TrackKind::Audio, None)
        .await
        .unwrap();

    let err = session
        .handle
        .replace_track(TrackKind::Audio, Some("ghost".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DeviceAcquisition(_)));

    let snapshot = session.handle.snapshot().await.unwrap();
    let track = snapshot.participants[0]
        .tracks
        .iter()
        .find(|t| t.kind == TrackKind::Audio)
        .unwrap();
    assert_eq!(track.name, "mic-0");
    assert!(session.acquirer.released.lock().unwrap().is_empty());
}

#[tokio::test]
async fn mute_announces_track_state_to_the_room() {
    let session = spawn_session(true, &[], &[]);

    session
        .handle
        .set_track_enabled(TrackKind::Audio, false)
        .await
        .unwrap();

    let sent = session.sent.lock().unwrap();
    assert!(sent.iter().any(|m| matches!(
        m,
        SignalingMessage::TrackState {
            participant_id,
            kind: TrackKind::Audio,
            enabled: false,
        } if participant_id == "wire-self"
    )));
}

#[tokio::test]
async fn leave_stops_recording_and_tears_down_in_order() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session.handle.start_recording().await.unwrap();
    session.handle.leave().await.unwrap();
    wait_for_left(&mut updates).await;

    // Recording flushed before the channel went away.
    assert!(session.recorder.open.lock().unwrap().is_empty());

    // Best-effort leave notification went out on the wire.
    assert!(session.sent.lock().unwrap().iter().any(|m| matches!(
        m,
        SignalingMessage::Leave { from } if from == "wire-self"
    )));

    // Backend told, state discarded.
    assert_eq!(*session.room_service.left.lock().unwrap(), vec!["ABC123"]);
    assert!(session.handle.snapshot().await.is_err());

    // No transition out of Left.
    assert!(matches!(
        session.handle.leave().await.unwrap_err(),
        SessionError::InvalidOperation(_)
    ));
}

#[tokio::test]
async fn channel_loss_tears_the_room_down() {
    let session = spawn_session(true, &[], &[]);
    let mut updates = session.handle.subscribe();

    session.state_tx.send_replace(ConnectionState::Failed);
    wait_for_left(&mut updates).await;

    assert!(session.handle.snapshot().await.is_err());
}
