use tracing::debug;

use super::state::Room;
use crate::error::{SessionError, SessionResult};
use crate::signaling::SignalingMessage;

/// Where the local participant stands in the join/leave lifecycle.
///
/// Idle → Joining → Active → Leaving → Left, with Joining → Left on
/// handshake failure. Left is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Idle,
    Joining,
    Active,
    Leaving,
    Left,
}

/// Owns the room aggregate and gates every operation on membership.
///
/// Remote events and local commands only touch the room while Active;
/// everything else folds to a no-op or an `InvalidOperation`.
#[derive(Debug)]
pub struct SessionEngine {
    membership: Membership,
    room: Option<Room>,
}

impl SessionEngine {
    pub fn new() -> Self {
        Self {
            membership: Membership::Idle,
            room: None,
        }
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    /// Mutable access to the room, only while Active.
    pub fn active_room_mut(&mut self) -> SessionResult<&mut Room> {
        if self.membership != Membership::Active {
            return Err(SessionError::InvalidOperation(format!(
                "room is not active (membership: {:?})",
                self.membership
            )));
        }
        Ok(self
            .room
            .as_mut()
            .expect("active membership always has a room"))
    }

    /// Idle → Joining, on the local join command.
    pub fn begin_join(&mut self) -> SessionResult<()> {
        match self.membership {
            Membership::Idle => {
                self.membership = Membership::Joining;
                Ok(())
            }
            other => Err(SessionError::InvalidOperation(format!(
                "cannot join from {:?}",
                other
            ))),
        }
    }

    /// Joining → Active, on handshake success.
    pub fn complete_join(&mut self, room: Room) -> SessionResult<()> {
        match self.membership {
            Membership::Joining => {
                self.membership = Membership::Active;
                self.room = Some(room);
                Ok(())
            }
            other => Err(SessionError::InvalidOperation(format!(
                "cannot complete join from {:?}",
                other
            ))),
        }
    }

    /// Joining → Left, on handshake failure.
    pub fn fail_join(&mut self) {
        if self.membership == Membership::Joining {
            self.membership = Membership::Left;
        }
    }

    /// Active → Leaving, on the explicit leave command.
    pub fn begin_leave(&mut self) -> SessionResult<()> {
        match self.membership {
            Membership::Active => {
                self.membership = Membership::Leaving;
                Ok(())
            }
            other => Err(SessionError::InvalidOperation(format!(
                "cannot leave from {:?}",
                other
            ))),
        }
    }

    /// Leaving → Left, unconditionally. Leave is best-effort: local cleanup
    /// proceeds even when the final leave notification could not be sent.
    pub fn complete_leave(&mut self) {
        if self.membership == Membership::Leaving {
            self.membership = Membership::Left;
            self.room = None;
        }
    }

    /// Fold one remote event into the room. No-op outside Active.
    pub fn apply_remote(&mut self, message: &SignalingMessage) -> bool {
        match (self.membership, self.room.as_mut()) {
            (Membership::Active, Some(room)) => room.apply(message),
            _ => {
                debug!(
                    "Dropping signaling event outside active membership ({:?})",
                    self.membership
                );
                false
            }
        }
    }
}

impl Default for SessionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::types::{Participant, RoomId};

    fn room() -> Room {
        Room::new(
            RoomId::parse("ABC123").unwrap(),
            "Standup",
            Participant::local("Host", true),
            "wire-self",
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut engine = SessionEngine::new();
        assert_eq!(engine.membership(), Membership::Idle);

        engine.begin_join().unwrap();
        assert_eq!(engine.membership(), Membership::Joining);

        engine.complete_join(room()).unwrap();
        assert_eq!(engine.membership(), Membership::Active);

        engine.begin_leave().unwrap();
        assert_eq!(engine.membership(), Membership::Leaving);

        engine.complete_leave();
        assert_eq!(engine.membership(), Membership::Left);
        assert!(engine.room().is_none());
    }

    #[test]
    fn handshake_failure_goes_to_left() {
        let mut engine = SessionEngine::new();
        engine.begin_join().unwrap();
        engine.fail_join();
        assert_eq!(engine.membership(), Membership::Left);
    }

    #[test]
    fn no_transition_out_of_left() {
        let mut engine = SessionEngine::new();
        engine.begin_join().unwrap();
        engine.fail_join();

        assert!(engine.begin_join().is_err());
        assert!(engine.begin_leave().is_err());
        assert!(engine.complete_join(room()).is_err());
        assert_eq!(engine.membership(), Membership::Left);
    }

    #[test]
    fn double_join_is_invalid() {
        let mut engine = SessionEngine::new();
        engine.begin_join().unwrap();
        assert!(engine.begin_join().is_err());
    }

    #[test]
    fn events_outside_active_are_dropped() {
        let mut engine = SessionEngine::new();
        let changed = engine.apply_remote(&SignalingMessage::ParticipantLeft {
            participant_id: "p1".to_string(),
        });
        assert!(!changed);
    }
}
