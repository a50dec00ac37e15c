use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::{DeviceAcquisitionError, SessionResult};
use crate::room::{Track, TrackKind};
use crate::voice::SpectrumFrame;

/// One media endpoint as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// Everything the platform currently offers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInventory {
    pub audio_inputs: Vec<DeviceInfo>,
    pub audio_outputs: Vec<DeviceInfo>,
    pub video_inputs: Vec<DeviceInfo>,
}

/// Platform device enumeration backend.
///
/// Platform-specific implementations (CoreAudio, WASAPI, a browser shim)
/// live with the embedding application; tests use an in-memory double.
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    /// Enumerate the current device set.
    async fn list_devices(&self) -> SessionResult<DeviceInventory>;

    /// Subscribe to hot-swap events. Each message is the full inventory
    /// after the change.
    async fn subscribe(&self) -> SessionResult<mpsc::Receiver<DeviceInventory>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Acquires and releases capture handles for local tracks. The actual
/// capture pipeline is an external collaborator; the core only tracks
/// ownership.
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    async fn acquire(
        &self,
        kind: TrackKind,
        device_id: Option<&str>,
    ) -> Result<Track, DeviceAcquisitionError>;

    /// Release a previously acquired track's underlying handle.
    async fn release(&self, track: Track);

    /// Frequency-domain frames for an acquired audio track, when the
    /// capture pipeline offers analysis. Feeds the voice-activity monitor.
    async fn spectrum(&self, _track: &Track) -> Option<mpsc::Receiver<SpectrumFrame>> {
        None
    }
}

/// Tracks the available input/output endpoints and forwards hot-swap
/// events to the session event queue.
pub struct DeviceRegistry {
    platform: Box<dyn DevicePlatform>,
    inventory_tx: watch::Sender<DeviceInventory>,
}

impl DeviceRegistry {
    pub fn new(platform: Box<dyn DevicePlatform>) -> Self {
        let (inventory_tx, _) = watch::channel(DeviceInventory::default());
        Self {
            platform,
            inventory_tx,
        }
    }

    /// Last observed inventory.
    pub fn inventory(&self) -> watch::Receiver<DeviceInventory> {
        self.inventory_tx.subscribe()
    }

    /// Refresh the cached inventory from the platform.
    pub async fn list_devices(&self) -> SessionResult<DeviceInventory> {
        let inventory = self.platform.list_devices().await?;
        self.inventory_tx.send_replace(inventory.clone());
        Ok(inventory)
    }

    /// Run the hot-swap watcher until the platform stream ends or shutdown
    /// is signalled. Each change is cached and forwarded to `changes`.
    pub async fn run(
        &self,
        changes: mpsc::Sender<DeviceInventory>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionResult<()> {
        let mut platform_rx = self.platform.subscribe().await?;
        info!("Device registry watching {}", self.platform.name());

        loop {
            tokio::select! {
                maybe_inventory = platform_rx.recv() => {
                    let Some(inventory) = maybe_inventory else {
                        info!("Device platform stream ended");
                        break;
                    };
                    self.inventory_tx.send_replace(inventory.clone());
                    if changes.send(inventory).await.is_err() {
                        warn!("Device change consumer is gone, stopping watcher");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Device registry shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
