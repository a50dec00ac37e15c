//! Multi-participant recording orchestration.
//!
//! The coordinator opens and closes one recorder per participant through
//! the external recorder collaborator, tolerates partial failures, and
//! keeps the elapsed-time counter honest via a 1-second monotonic tick.

pub mod coordinator;
pub mod recorder;
pub mod session;

pub use coordinator::RecordingCoordinator;
pub use recorder::{MediaSource, Recorder, RecorderError, RecorderHandle};
pub use session::{
    RecorderState, RecordingSession, RecordingStarted, RecordingStatus, RecordingSummary,
};
