use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SessionError, SessionResult};

/// Reserved participant ID for the local user.
pub const SELF_PARTICIPANT_ID: &str = "self";

/// Opaque 6-character room identifier (uppercase alphanumeric).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: &str) -> SessionResult<Self> {
        if raw.len() != 6 || !raw.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(SessionError::InvalidOperation(format!(
                "malformed room id: {:?}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media kind of a track. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// One media stream owned by exactly one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Opaque transport identifier.
    pub name: String,
    pub kind: TrackKind,
    pub enabled: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
        }
    }
}

/// One human endpoint in a room, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub is_host: bool,

    /// Observed track-enabled state, independent of whether tracks exist.
    pub is_muted: bool,
    pub is_video_on: bool,

    /// Derived speaking signal; only meaningful while unmuted.
    pub is_speaking: bool,

    /// Transport-layer session identifier used for track subscription.
    /// Weak reference: lookup only, never owned.
    pub session_id: Option<String>,

    pub tracks: Vec<Track>,
}

impl Participant {
    /// The local participant, created at join time.
    pub fn local(name: impl Into<String>, is_host: bool) -> Self {
        Self {
            id: SELF_PARTICIPANT_ID.to_string(),
            name: name.into(),
            is_host,
            is_muted: false,
            is_video_on: false,
            is_speaking: false,
            session_id: None,
            tracks: Vec::new(),
        }
    }

    /// A remote participant as first seen on the wire. Announced tracks
    /// start enabled; the mute/video flags are derived from them.
    pub fn remote(
        id: impl Into<String>,
        name: impl Into<String>,
        session_id: impl Into<String>,
        tracks: Vec<Track>,
    ) -> Self {
        let has_video = tracks.iter().any(|t| t.kind == TrackKind::Video && t.enabled);
        let has_audio = tracks.iter().any(|t| t.kind == TrackKind::Audio && t.enabled);
        Self {
            id: id.into(),
            name: name.into(),
            is_host: false,
            is_muted: !has_audio,
            is_video_on: has_video,
            is_speaking: false,
            session_id: Some(session_id.into()),
            tracks,
        }
    }

    pub fn is_self(&self) -> bool {
        self.id == SELF_PARTICIPANT_ID
    }

    /// First track of the given kind, if any.
    pub fn track(&self, kind: TrackKind) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    pub fn track_mut(&mut self, kind: TrackKind) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.kind == kind)
    }

    /// Record an observed enabled-state change for one kind. Updates the
    /// observed flags even when no track of that kind exists yet.
    pub fn set_kind_enabled(&mut self, kind: TrackKind, enabled: bool) {
        if let Some(track) = self.track_mut(kind) {
            track.enabled = enabled;
        }
        match kind {
            TrackKind::Audio => {
                self.is_muted = !enabled;
                if self.is_muted {
                    self.is_speaking = false;
                }
            }
            TrackKind::Video => self.is_video_on = enabled,
        }
    }
}
