use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use super::recorder::{MediaSource, Recorder};
use super::session::{
    RecorderState, RecordingSession, RecordingStarted, RecordingStatus, RecordingSummary,
};
use crate::error::{RecorderFailure, SessionError, SessionResult};

/// Orchestrates per-participant recorders with all-or-nothing session
/// semantics: one logical recording session covers every participant, but
/// a participant whose recorder fails is reported and dropped from the set
/// rather than aborting the rest.
///
/// State machine: Stopped → Starting → Recording → Stopping → Stopped.
/// A participant leaving is a self-transition within Recording. All calls
/// arrive serialized through the session event queue, so transitions never
/// race.
pub struct RecordingCoordinator {
    recorder: Arc<dyn Recorder>,
    state: RecorderState,
    session: Option<RecordingSession>,
    failures: Vec<RecorderFailure>,
}

impl RecordingCoordinator {
    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self {
            recorder,
            state: RecorderState::Stopped,
            session: None,
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().map(|s| s.is_active).unwrap_or(false)
    }

    /// Open a recorder for every resolvable participant. Individual open
    /// failures degrade the session instead of aborting it; starting while
    /// a session is active is a caller error.
    pub async fn start_session(
        &mut self,
        sources: Vec<MediaSource>,
    ) -> SessionResult<RecordingStarted> {
        if self.state != RecorderState::Stopped {
            return Err(SessionError::InvalidOperation(format!(
                "recording session already active (state: {:?})",
                self.state
            )));
        }

        self.state = RecorderState::Starting;
        self.failures.clear();

        info!("Starting recording session for {} participant(s)", sources.len());

        let mut opened = Vec::new();
        for source in &sources {
            match self
                .recorder
                .start_recording(&source.participant_id, source)
                .await
            {
                Ok(handle) => {
                    info!(
                        "Recorder open for {} (handle {})",
                        source.participant_id, handle.id
                    );
                    opened.push(source.participant_id.clone());
                }
                Err(e) => {
                    warn!("Recorder failed to open for {}: {}", source.participant_id, e);
                    self.failures.push(RecorderFailure {
                        participant_id: source.participant_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let started_at = Utc::now();
        let started = RecordingStarted {
            started_at,
            active_participants: opened.clone(),
            failures: self.failures.clone(),
        };

        if started.is_degraded() {
            warn!(
                "Recording session degraded: {}/{} recorders open",
                opened.len(),
                sources.len()
            );
        }

        self.session = Some(RecordingSession::new(started_at, opened));
        self.state = RecorderState::Recording;

        Ok(started)
    }

    /// Close every open recorder in parallel, best-effort, and finalize the
    /// session. The session always deactivates, even when closes fail.
    pub async fn stop_session(&mut self) -> SessionResult<RecordingSummary> {
        if self.state != RecorderState::Recording {
            return Err(SessionError::InvalidOperation(
                "no recording session to stop".to_string(),
            ));
        }

        self.state = RecorderState::Stopping;

        let mut session = self
            .session
            .take()
            .expect("recording state always has a session");
        // Freeze the counter before any await so slow closes cannot drift
        // past the stop instant.
        session.is_active = false;

        let ids: Vec<String> = session
            .active_participant_recordings
            .iter()
            .cloned()
            .collect();

        info!("Stopping recording session ({} recorder(s))", ids.len());

        let recorder = Arc::clone(&self.recorder);
        let closes = ids.iter().map(|id| {
            let recorder = Arc::clone(&recorder);
            async move { (id.clone(), recorder.stop_recording(id).await) }
        });

        let close_failures: Vec<RecorderFailure> = join_all(closes)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!("Recorder failed to close for {}: {}", id, e);
                    Some(RecorderFailure {
                        participant_id: id,
                        reason: e.to_string(),
                    })
                }
            })
            .collect();

        let summary = RecordingSummary {
            duration_seconds: session.elapsed_seconds,
            participants: session.recorded_participants().to_vec(),
            close_failures,
        };

        self.state = RecorderState::Stopped;

        info!(
            "Recording session stopped after {}s ({} participant(s))",
            summary.duration_seconds,
            summary.participants.len()
        );

        Ok(summary)
    }

    /// A participant left mid-session: close just their recorder. The
    /// session keeps running for everyone else.
    pub async fn on_participant_left(&mut self, participant_id: &str) {
        if self.state != RecorderState::Recording {
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.active_participant_recordings.remove(participant_id) {
            return;
        }

        info!("Closing recorder for departed participant {}", participant_id);

        if let Err(e) = self.recorder.stop_recording(participant_id).await {
            warn!(
                "Recorder failed to close for departed participant {}: {}",
                participant_id, e
            );
            self.failures.push(RecorderFailure {
                participant_id: participant_id.to_string(),
                reason: e.to_string(),
            });
        }
    }

    /// One-second monotonic tick. Only counts while the session is active.
    pub fn tick(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.is_active {
                session.elapsed_seconds += 1;
            }
        }
    }

    pub fn status(&self) -> RecordingStatus {
        let session = self.session.as_ref();
        RecordingStatus {
            state: self.state,
            is_active: self.is_active(),
            started_at: session.map(|s| s.started_at),
            elapsed_seconds: session.map(|s| s.elapsed_seconds).unwrap_or(0),
            active_participants: session
                .map(|s| {
                    let mut ids: Vec<String> =
                        s.active_participant_recordings.iter().cloned().collect();
                    ids.sort();
                    ids
                })
                .unwrap_or_default(),
            failures: self.failures.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::recorder::{RecorderError, RecorderHandle};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Recorder double that fails for a configured set of participants.
    struct FlakyRecorder {
        fail_open: HashSet<String>,
        fail_close: HashSet<String>,
        open: Mutex<HashSet<String>>,
    }

    impl FlakyRecorder {
        fn new(fail_open: &[&str], fail_close: &[&str]) -> Self {
            Self {
                fail_open: fail_open.iter().map(|s| s.to_string()).collect(),
                fail_close: fail_close.iter().map(|s| s.to_string()).collect(),
                open: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait]
    impl Recorder for FlakyRecorder {
        async fn start_recording(
            &self,
            participant_id: &str,
            _source: &MediaSource,
        ) -> Result<RecorderHandle, RecorderError> {
            if self.fail_open.contains(participant_id) {
                return Err(RecorderError::Open("device acquisition failed".to_string()));
            }
            self.open.lock().unwrap().insert(participant_id.to_string());
            Ok(RecorderHandle::new())
        }

        async fn stop_recording(&self, participant_id: &str) -> Result<(), RecorderError> {
            self.open.lock().unwrap().remove(participant_id);
            if self.fail_close.contains(participant_id) {
                return Err(RecorderError::Close("flush failed".to_string()));
            }
            Ok(())
        }
    }

    fn source(id: &str) -> MediaSource {
        MediaSource {
            participant_id: id.to_string(),
            session_id: format!("sess-{}", id),
            track_names: vec![format!("mic-{}", id)],
        }
    }

    #[tokio::test]
    async fn partial_open_failure_degrades_but_records() {
        let recorder = Arc::new(FlakyRecorder::new(&["p2"], &[]));
        let mut coordinator = RecordingCoordinator::new(recorder);

        let started = coordinator
            .start_session(vec![source("self"), source("p1"), source("p2")])
            .await
            .unwrap();

        assert!(coordinator.is_active());
        assert_eq!(started.active_participants, vec!["self", "p1"]);
        assert_eq!(started.failures.len(), 1);
        assert_eq!(started.failures[0].participant_id, "p2");
        assert!(started.is_degraded());
    }

    #[tokio::test]
    async fn double_start_is_invalid() {
        let recorder = Arc::new(FlakyRecorder::new(&[], &[]));
        let mut coordinator = RecordingCoordinator::new(recorder);

        coordinator.start_session(vec![source("self")]).await.unwrap();
        let err = coordinator
            .start_session(vec![source("self")])
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn stop_deactivates_even_when_closes_fail() {
        let recorder = Arc::new(FlakyRecorder::new(&[], &["p1"]));
        let mut coordinator = RecordingCoordinator::new(recorder);

        coordinator
            .start_session(vec![source("self"), source("p1")])
            .await
            .unwrap();
        let summary = coordinator.stop_session().await.unwrap();

        assert!(!coordinator.is_active());
        assert_eq!(coordinator.state(), RecorderState::Stopped);
        assert_eq!(summary.participants, vec!["self", "p1"]);
        assert_eq!(summary.close_failures.len(), 1);
        assert_eq!(summary.close_failures[0].participant_id, "p1");
    }

    #[tokio::test]
    async fn stop_without_start_is_invalid() {
        let recorder = Arc::new(FlakyRecorder::new(&[], &[]));
        let mut coordinator = RecordingCoordinator::new(recorder);

        assert!(matches!(
            coordinator.stop_session().await.unwrap_err(),
            SessionError::InvalidOperation(_)
        ));
    }

    #[tokio::test]
    async fn participant_left_closes_only_their_recorder() {
        let recorder = Arc::new(FlakyRecorder::new(&[], &[]));
        let mut coordinator = RecordingCoordinator::new(Arc::clone(&recorder) as Arc<dyn Recorder>);

        coordinator
            .start_session(vec![source("self"), source("p1")])
            .await
            .unwrap();
        coordinator.on_participant_left("p1").await;

        assert!(coordinator.is_active());
        let status = coordinator.status();
        assert_eq!(status.active_participants, vec!["self"]);
        assert!(recorder.open.lock().unwrap().contains("self"));
        assert!(!recorder.open.lock().unwrap().contains("p1"));
    }

    #[tokio::test]
    async fn departed_unknown_participant_is_a_noop() {
        let recorder = Arc::new(FlakyRecorder::new(&[], &[]));
        let mut coordinator = RecordingCoordinator::new(recorder);

        coordinator.start_session(vec![source("self")]).await.unwrap();
        coordinator.on_participant_left("ghost").await;

        assert_eq!(coordinator.status().active_participants, vec!["self"]);
    }

    #[tokio::test]
    async fn ticks_count_only_while_active() {
        let recorder = Arc::new(FlakyRecorder::new(&[], &[]));
        let mut coordinator = RecordingCoordinator::new(recorder);

        coordinator.start_session(vec![source("self")]).await.unwrap();
        coordinator.tick();
        coordinator.tick();
        coordinator.tick();

        let summary = coordinator.stop_session().await.unwrap();
        assert_eq!(summary.duration_seconds, 3);

        // Ticks after stop never count.
        coordinator.tick();
        assert_eq!(coordinator.status().elapsed_seconds, 0);
    }
}
