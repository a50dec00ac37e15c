pub mod channel;
pub mod messages;

pub use channel::{ConnectionState, ControlChannel, SignalingChannel};
pub use messages::{ParticipantSnapshot, SignalingMessage, TrackDescriptor};
