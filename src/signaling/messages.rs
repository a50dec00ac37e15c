use serde::{Deserialize, Serialize};

use crate::room::TrackKind;

/// Control-plane message exchanged over the signaling channel.
///
/// The same wire shapes flow both ways: incoming messages describe what
/// remote participants did, outgoing messages announce what the local
/// participant is doing. Messages are JSON with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// A participant's published tracks become known to the room.
    #[serde(rename_all = "camelCase")]
    SessionAnnounce {
        participant_id: String,
        participant_name: String,
        session_id: String,
        tracks: Vec<TrackDescriptor>,
    },

    /// A participant left or was disconnected.
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { participant_id: String },

    /// Legacy leave notification, keyed by sender instead of participant.
    Leave { from: String },

    /// A participant enabled or disabled one of its tracks.
    #[serde(rename_all = "camelCase")]
    TrackState {
        participant_id: String,
        kind: TrackKind,
        enabled: bool,
    },

    /// A participant started or stopped speaking. Remote speaking state
    /// travels over signaling; only the local track is analyzed locally.
    #[serde(rename_all = "camelCase")]
    SpeakingState {
        participant_id: String,
        speaking: bool,
    },

    /// Bulk catch-up snapshot delivered to a newly joined participant.
    ExistingParticipants {
        participants: Vec<ParticipantSnapshot>,
    },
}

/// One track as described on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    pub track_name: String,
    pub kind: TrackKind,
}

/// One participant entry in an `existing-participants` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub participant_id: String,
    pub participant_name: String,
    pub session_id: String,
    #[serde(default)]
    pub tracks: Vec<TrackDescriptor>,
}
