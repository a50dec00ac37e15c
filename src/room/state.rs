use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::types::{Participant, RoomId, Track, TrackKind, SELF_PARTICIPANT_ID};
use crate::error::{SessionError, SessionResult};
use crate::signaling::{ParticipantSnapshot, SignalingMessage, TrackDescriptor};

/// A recording session's membership and identity context, scoped to one
/// signaling-server-issued room ID.
///
/// All mutation flows through the operations below; signaling events are
/// applied with [`Room::apply`], a deterministic fold. Participants are kept
/// in join order.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub host_participant_id: String,

    /// The wire identity remote participants know the local user by.
    /// Messages about this ID are our own echoes and fold to no-ops.
    local_wire_id: String,

    participants: Vec<Participant>,

    /// Transport session ID -> participant ID. Pruned on removal, never
    /// left dangling.
    session_index: HashMap<String, String>,
}

/// Point-in-time view of a room handed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub room_name: String,
    pub host_participant_id: String,
    pub participants: Vec<Participant>,
}

impl Room {
    /// Create a room containing only the local participant.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        local: Participant,
        local_wire_id: impl Into<String>,
    ) -> Self {
        debug_assert!(local.is_self());
        let host_participant_id = if local.is_host {
            SELF_PARTICIPANT_ID.to_string()
        } else {
            String::new()
        };

        let mut session_index = HashMap::new();
        if let Some(session_id) = &local.session_id {
            session_index.insert(session_id.clone(), local.id.clone());
        }

        Self {
            id,
            name: name.into(),
            host_participant_id,
            local_wire_id: local_wire_id.into(),
            participants: vec![local],
            session_index,
        }
    }

    /// Participants in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// The local participant. Exactly one exists for the room's lifetime.
    pub fn self_participant(&self) -> &Participant {
        self.participant(SELF_PARTICIPANT_ID)
            .expect("room always contains the local participant")
    }

    fn self_participant_mut(&mut self) -> &mut Participant {
        self.participant_mut(SELF_PARTICIPANT_ID)
            .expect("room always contains the local participant")
    }

    pub fn participant_id_for_session(&self, session_id: &str) -> Option<&str> {
        self.session_index.get(session_id).map(String::as_str)
    }

    /// Add a participant. Idempotent: a duplicate ID is a no-op and keeps
    /// the first-seen metadata. Returns whether the participant was added.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.participant(&participant.id).is_some() {
            debug!("Ignoring duplicate join for {}", participant.id);
            return false;
        }

        if let Some(session_id) = &participant.session_id {
            self.session_index
                .insert(session_id.clone(), participant.id.clone());
        }
        self.participants.push(participant);
        true
    }

    /// Remove a participant and invalidate everything it owned. Removing
    /// `"self"` is a caller error; removing an unknown ID is a no-op.
    pub fn remove_participant(&mut self, id: &str) -> SessionResult<Option<Participant>> {
        if id == SELF_PARTICIPANT_ID {
            return Err(SessionError::InvalidOperation(
                "the local participant cannot be removed from its own room".to_string(),
            ));
        }

        let Some(pos) = self.participants.iter().position(|p| p.id == id) else {
            return Ok(None);
        };

        let removed = self.participants.remove(pos);
        self.session_index.retain(|_, pid| pid != id);
        Ok(Some(removed))
    }

    /// Fold one remote signaling event into the room.
    ///
    /// Deterministic: the same event sequence applied to the same base state
    /// always yields the same room. Duplicate deliveries and events about
    /// unknown participants fold to no-ops. Returns whether state changed.
    pub fn apply(&mut self, message: &SignalingMessage) -> bool {
        match message {
            SignalingMessage::SessionAnnounce {
                participant_id,
                participant_name,
                session_id,
                tracks,
            } => {
                if participant_id == &self.local_wire_id {
                    return false;
                }
                let tracks = tracks.iter().map(track_from_descriptor).collect();
                self.add_participant(Participant::remote(
                    participant_id,
                    participant_name,
                    session_id,
                    tracks,
                ))
            }

            SignalingMessage::ParticipantLeft { participant_id } => {
                self.apply_departure(participant_id)
            }

            SignalingMessage::Leave { from } => self.apply_departure(from),

            SignalingMessage::TrackState {
                participant_id,
                kind,
                enabled,
            } => {
                if participant_id == &self.local_wire_id {
                    return false;
                }
                match self.participant_mut(participant_id) {
                    Some(participant) => {
                        participant.set_kind_enabled(*kind, *enabled);
                        true
                    }
                    None => {
                        debug!(
                            "Ignoring track-state for unknown participant {}",
                            participant_id
                        );
                        false
                    }
                }
            }

            SignalingMessage::SpeakingState {
                participant_id,
                speaking,
            } => {
                if participant_id == &self.local_wire_id {
                    return false;
                }
                match self.participant_mut(participant_id) {
                    // Speaking is only meaningful while unmuted.
                    Some(participant) if !participant.is_muted => {
                        let changed = participant.is_speaking != *speaking;
                        participant.is_speaking = *speaking;
                        changed
                    }
                    _ => false,
                }
            }

            SignalingMessage::ExistingParticipants { participants } => {
                let mut changed = false;
                for snapshot in participants {
                    if snapshot.participant_id == self.local_wire_id {
                        continue;
                    }
                    changed |= self.add_participant(participant_from_snapshot(snapshot));
                }
                changed
            }
        }
    }

    fn apply_departure(&mut self, participant_id: &str) -> bool {
        if participant_id == self.local_wire_id || participant_id == SELF_PARTICIPANT_ID {
            warn!("Ignoring departure event naming the local participant");
            return false;
        }
        match self.remove_participant(participant_id) {
            Ok(removed) => removed.is_some(),
            Err(_) => false,
        }
    }

    /// Flip the local track-enabled state for one kind and produce the
    /// outgoing announcement for the room.
    pub fn set_local_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> SignalingMessage {
        self.self_participant_mut().set_kind_enabled(kind, enabled);

        SignalingMessage::TrackState {
            participant_id: self.local_wire_id.clone(),
            kind,
            enabled,
        }
    }

    /// Atomically swap the local track for `kind`, preserving the previous
    /// enabled state across the swap so a device hot-swap never silently
    /// unmutes or re-enables video. Returns the replaced track; the caller
    /// releases its handle once the new one is confirmed live.
    pub fn replace_local_track(
        &mut self,
        kind: TrackKind,
        mut new_track: Track,
    ) -> SessionResult<Option<Track>> {
        if new_track.kind != kind {
            return Err(SessionError::InvalidOperation(format!(
                "track {} has kind {}, expected {}",
                new_track.name, new_track.kind, kind
            )));
        }

        let local = self.self_participant_mut();
        new_track.enabled = match kind {
            TrackKind::Audio => !local.is_muted,
            TrackKind::Video => local.is_video_on,
        };

        match local.tracks.iter().position(|t| t.kind == kind) {
            Some(pos) => {
                let old = std::mem::replace(&mut local.tracks[pos], new_track);
                Ok(Some(old))
            }
            None => {
                local.tracks.push(new_track);
                Ok(None)
            }
        }
    }

    /// Record the local speaking signal computed by the voice monitor.
    /// Returns the outgoing announcement when the state actually changed.
    pub fn set_local_speaking(&mut self, speaking: bool) -> Option<SignalingMessage> {
        let local = self.self_participant_mut();
        if local.is_muted || local.is_speaking == speaking {
            return None;
        }
        local.is_speaking = speaking;

        Some(SignalingMessage::SpeakingState {
            participant_id: self.local_wire_id.clone(),
            speaking,
        })
    }

    pub fn local_wire_id(&self) -> &str {
        &self.local_wire_id
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.to_string(),
            room_name: self.name.clone(),
            host_participant_id: self.host_participant_id.clone(),
            participants: self.participants.clone(),
        }
    }
}

fn track_from_descriptor(descriptor: &TrackDescriptor) -> Track {
    Track::new(descriptor.track_name.clone(), descriptor.kind)
}

fn participant_from_snapshot(snapshot: &ParticipantSnapshot) -> Participant {
    Participant::remote(
        &snapshot.participant_id,
        &snapshot.participant_name,
        &snapshot.session_id,
        snapshot.tracks.iter().map(track_from_descriptor).collect(),
    )
}
