use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecorderFailure;

/// Lifecycle of the recording coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Stopped,
    Starting,
    Recording,
    Stopping,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Stopped
    }
}

/// One in-flight multi-participant recording.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub is_active: bool,
    pub started_at: DateTime<Utc>,

    /// Seconds counted by the coordinator's monotonic tick, not wall-clock
    /// subtraction, so the count freezes the instant the session stops.
    pub elapsed_seconds: u64,

    /// Participants with a currently-open recorder.
    pub active_participant_recordings: HashSet<String>,

    /// Everyone who ever had an open recorder, in open order.
    recorded_participants: Vec<String>,
}

impl RecordingSession {
    pub fn new(started_at: DateTime<Utc>, opened: Vec<String>) -> Self {
        Self {
            is_active: true,
            started_at,
            elapsed_seconds: 0,
            active_participant_recordings: opened.iter().cloned().collect(),
            recorded_participants: opened,
        }
    }

    pub fn recorded_participants(&self) -> &[String] {
        &self.recorded_participants
    }
}

/// Outcome of a start command. Degraded when some participants failed to
/// open; the session still runs for the rest.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingStarted {
    pub started_at: DateTime<Utc>,
    pub active_participants: Vec<String>,
    pub failures: Vec<RecorderFailure>,
}

impl RecordingStarted {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Final metadata returned by a stop command.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub duration_seconds: u64,
    pub participants: Vec<String>,
    pub close_failures: Vec<RecorderFailure>,
}

/// Observer view of the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingStatus {
    pub state: RecorderState,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub active_participants: Vec<String>,
    pub failures: Vec<RecorderFailure>,
}
