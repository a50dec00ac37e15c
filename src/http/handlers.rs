use super::state::AppState;
use crate::error::{ErrorResponse, SessionError};
use crate::room::{join, JoinRequest, RoomId, RoomSnapshot, TrackKind};
use crate::recording::{RecordingStatus, RecordingSummary};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub room_id: String,
    pub room_name: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackStateRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceTrackRequest {
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomStatusResponse {
    pub room: RoomSnapshot,
    pub recording: RecordingStatus,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub room_id: String,
    pub status: String,
    pub summary: RecordingSummary,
}

fn error_response(error: &SessionError) -> axum::response::Response {
    let status = match error {
        SessionError::InvalidOperation(_) => StatusCode::CONFLICT,
        SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
        SessionError::DeviceAcquisition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::PartialRecordingFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::from(error))).into_response()
}

fn not_found(room_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            code: "ROOM_NOT_FOUND".to_string(),
            message: format!("No active membership for room {}", room_id),
        }),
    )
        .into_response()
}

fn parse_kind(raw: &str) -> Option<TrackKind> {
    match raw {
        "audio" => Some(TrackKind::Audio),
        "video" => Some(TrackKind::Video),
        _ => None,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /rooms
/// Create a room and join it as host
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> impl IntoResponse {
    info!("Creating room {:?} as {}", req.room_name, req.display_name);

    let request = JoinRequest {
        room_id: None,
        room_name: req.room_name,
        display_name: req.display_name,
    };

    match join(state.deps.clone(), request).await {
        Ok(handle) => {
            let snapshot = match handle.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => return error_response(&e),
            };

            let mut sessions = state.sessions.write().await;
            sessions.insert(snapshot.room_id.clone(), handle);

            (
                StatusCode::OK,
                Json(MembershipResponse {
                    room_id: snapshot.room_id,
                    room_name: snapshot.room_name,
                    status: "active".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to create room: {}", e);
            error_response(&e)
        }
    }
}

/// POST /rooms/:room_id/join
/// Join an existing room
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<JoinRoomRequest>,
) -> impl IntoResponse {
    let room_id = match RoomId::parse(&room_id) {
        Ok(room_id) => room_id,
        Err(e) => return error_response(&e),
    };

    info!("Joining room {} as {}", room_id, req.display_name);

    // One membership per room at a time.
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(room_id.as_str()) {
            return error_response(&SessionError::InvalidOperation(format!(
                "already a member of room {}",
                room_id
            )));
        }
    }

    let request = JoinRequest {
        room_id: Some(room_id.clone()),
        room_name: String::new(),
        display_name: req.display_name,
    };

    match join(state.deps.clone(), request).await {
        Ok(handle) => {
            let snapshot = match handle.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => return error_response(&e),
            };

            let mut sessions = state.sessions.write().await;
            sessions.insert(snapshot.room_id.clone(), handle);

            (
                StatusCode::OK,
                Json(MembershipResponse {
                    room_id: snapshot.room_id,
                    room_name: snapshot.room_name,
                    status: "active".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to join room {}: {}", room_id, e);
            error_response(&e)
        }
    }
}

/// POST /rooms/:room_id/leave
/// Leave a room and tear the membership down
pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let handle = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&room_id)
    };

    match handle {
        Some(handle) => match handle.leave().await {
            Ok(()) => (
                StatusCode::OK,
                Json(MembershipResponse {
                    room_id,
                    room_name: String::new(),
                    status: "left".to_string(),
                }),
            )
                .into_response(),
            Err(e) => {
                error!("Failed to leave room {}: {}", room_id, e);
                error_response(&e)
            }
        },
        None => not_found(&room_id),
    }
}

/// GET /rooms/:room_id/info
/// Room metadata from the room backend
pub async fn room_info(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    let Some(handle) = sessions.get(&room_id) else {
        return not_found(&room_id);
    };

    match handle.room_info().await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /rooms/:room_id/status
/// Current room and recording state
pub async fn room_status(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    let Some(handle) = sessions.get(&room_id) else {
        return not_found(&room_id);
    };

    let room = match handle.snapshot().await {
        Ok(room) => room,
        Err(e) => return error_response(&e),
    };
    let recording = match handle.recording_status().await {
        Ok(recording) => recording,
        Err(e) => return error_response(&e),
    };

    (StatusCode::OK, Json(RoomStatusResponse { room, recording })).into_response()
}

/// POST /rooms/:room_id/tracks/:kind
/// Enable or disable the local track of one kind
pub async fn set_track_state(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    Json(req): Json<TrackStateRequest>,
) -> impl IntoResponse {
    let Some(kind) = parse_kind(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "BAD_TRACK_KIND".to_string(),
                message: format!("unknown track kind: {}", kind),
            }),
        )
            .into_response();
    };

    let sessions = state.sessions.read().await;
    let Some(handle) = sessions.get(&room_id) else {
        return not_found(&room_id);
    };

    match handle.set_track_enabled(kind, req.enabled).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /rooms/:room_id/tracks/:kind/replace
/// Hot-swap the local capture device for one kind
pub async fn replace_track(
    State(state): State<AppState>,
    Path((room_id, kind)): Path<(String, String)>,
    Json(req): Json<ReplaceTrackRequest>,
) -> impl IntoResponse {
    let Some(kind) = parse_kind(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                code: "BAD_TRACK_KIND".to_string(),
                message: format!("unknown track kind: {}", kind),
            }),
        )
            .into_response();
    };

    let sessions = state.sessions.read().await;
    let Some(handle) = sessions.get(&room_id) else {
        return not_found(&room_id);
    };

    match handle.replace_track(kind, req.device_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /rooms/:room_id/recording/start
/// Start the multi-participant recording session (host only)
pub async fn start_recording(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    let Some(handle) = sessions.get(&room_id) else {
        return not_found(&room_id);
    };

    match handle.start_recording().await {
        Ok(started) => {
            if started.is_degraded() {
                info!(
                    "Recording for {} started degraded: {} failure(s)",
                    room_id,
                    started.failures.len()
                );
            }
            (StatusCode::OK, Json(started)).into_response()
        }
        Err(e) => {
            error!("Failed to start recording for {}: {}", room_id, e);
            error_response(&e)
        }
    }
}

/// POST /rooms/:room_id/recording/stop
/// Stop the recording session and return its summary
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    let Some(handle) = sessions.get(&room_id) else {
        return not_found(&room_id);
    };

    match handle.stop_recording().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(StopRecordingResponse {
                room_id,
                status: "stopped".to_string(),
                summary,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop recording for {}: {}", room_id, e);
            error_response(&e)
        }
    }
}

/// GET /devices
/// Enumerate available capture devices
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list_devices().await {
        Ok(inventory) => (StatusCode::OK, Json(inventory)).into_response(),
        Err(e) => {
            error!("Failed to list devices: {}", e);
            error_response(&e)
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
