//! Room membership and the session state machine.
//!
//! This module owns the Room/Participant/Track aggregate, the membership
//! lifecycle, and the single-consumer driver that serializes every
//! signaling event, local command, and timer tick.

pub mod driver;
pub mod engine;
pub mod service;
pub mod state;
pub mod types;

pub use driver::{join, JoinRequest, SessionDeps, SessionDriver, SessionHandle, SessionUpdate};
pub use engine::{Membership, SessionEngine};
pub use service::{RoomCredentials, RoomInfo, RoomService};
pub use state::{Room, RoomSnapshot};
pub use types::{Participant, RoomId, Track, TrackKind, SELF_PARTICIPANT_ID};
