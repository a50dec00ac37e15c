//! HTTP control surface for the session core
//!
//! External collaborators (a UI shell, automation) drive the core through
//! this REST API instead of mutating state directly:
//! - POST /rooms - Create a room and join as host
//! - POST /rooms/:id/join - Join an existing room
//! - POST /rooms/:id/leave - Leave and tear down
//! - GET /rooms/:id/status - Room + recording state
//! - GET /rooms/:id/info - Room metadata from the backend
//! - POST /rooms/:id/tracks/:kind - Enable/disable a local track
//! - POST /rooms/:id/tracks/:kind/replace - Hot-swap a capture device
//! - POST /rooms/:id/recording/start - Start the recording session
//! - POST /rooms/:id/recording/stop - Stop and summarize
//! - GET /devices - Enumerate capture devices
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
