use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::room::Participant;

/// Errors from the external recorder collaborator.
#[derive(Error, Debug, Clone)]
pub enum RecorderError {
    #[error("failed to open recorder: {0}")]
    Open(String),

    #[error("failed to close recorder: {0}")]
    Close(String),
}

/// What the recorder needs to resolve one participant's media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub participant_id: String,
    /// Transport-layer session used for track subscription.
    pub session_id: String,
    pub track_names: Vec<String>,
}

impl MediaSource {
    /// Build the source for a participant, if one is resolvable. A
    /// participant without a transport session has nothing to subscribe to
    /// and is skipped by the coordinator.
    pub fn for_participant(participant: &Participant) -> Option<Self> {
        let session_id = participant.session_id.clone()?;
        Some(Self {
            participant_id: participant.id.clone(),
            session_id,
            track_names: participant.tracks.iter().map(|t| t.name.clone()).collect(),
        })
    }
}

/// Handle to one participant's open capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderHandle {
    pub id: Uuid,
}

impl RecorderHandle {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl Default for RecorderHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// External collaborator that persists a participant's media to storage.
/// The core never encodes; it only orchestrates open/close.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start_recording(
        &self,
        participant_id: &str,
        source: &MediaSource,
    ) -> Result<RecorderHandle, RecorderError>;

    async fn stop_recording(&self, participant_id: &str) -> Result<(), RecorderError>;
}
