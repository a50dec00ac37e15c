use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::RoomId;
use crate::error::SessionResult;

/// Credentials handed back by the room backend on create or join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCredentials {
    pub room_id: RoomId,
    pub room_name: String,
    /// Bearer token for subsequent room operations. The core holds it for
    /// the membership's lifetime but never persists it.
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

/// Room metadata as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub host_id: String,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

/// Room-lifecycle backend consumed by the core. Implementations live with
/// the embedding application (HTTP client, test double).
#[async_trait]
pub trait RoomService: Send + Sync {
    async fn create_room(&self, room_name: &str) -> SessionResult<RoomCredentials>;

    async fn join_room(&self, room_id: &RoomId) -> SessionResult<RoomCredentials>;

    async fn room_info(&self, room_id: &RoomId, token: &str) -> SessionResult<RoomInfo>;

    /// Best-effort: callers proceed with local cleanup even when this fails.
    async fn leave_room(&self, room_id: &RoomId, token: &str) -> SessionResult<()>;
}
