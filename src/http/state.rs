use crate::devices::DeviceRegistry;
use crate::room::{SessionDeps, SessionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Collaborators handed to every new room membership
    pub deps: SessionDeps,

    /// Platform device registry
    pub registry: Arc<DeviceRegistry>,

    /// Active room memberships (room_id → session handle)
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl AppState {
    pub fn new(deps: SessionDeps, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            deps,
            registry,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
