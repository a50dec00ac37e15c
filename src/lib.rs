pub mod config;
pub mod devices;
pub mod error;
pub mod http;
pub mod recording;
pub mod room;
pub mod signaling;
pub mod voice;

pub use config::Config;
pub use devices::{DeviceInfo, DeviceInventory, DevicePlatform, DeviceRegistry, MediaAcquirer};
pub use error::{
    DeviceAcquisitionError, ErrorResponse, RecorderFailure, SessionError, SessionResult,
};
pub use http::{create_router, AppState};
pub use recording::{
    MediaSource, Recorder, RecorderError, RecorderHandle, RecorderState, RecordingCoordinator,
    RecordingSession, RecordingStarted, RecordingStatus, RecordingSummary,
};
pub use room::{
    join, JoinRequest, Membership, Participant, Room, RoomCredentials, RoomId, RoomInfo,
    RoomService, RoomSnapshot, SessionDeps, SessionDriver, SessionEngine, SessionHandle,
    SessionUpdate, Track, TrackKind, SELF_PARTICIPANT_ID,
};
pub use signaling::{
    ConnectionState, ControlChannel, ParticipantSnapshot, SignalingChannel, SignalingMessage,
    TrackDescriptor,
};
pub use voice::{SpectrumFrame, VoiceActivityConfig, VoiceActivityMonitor};
