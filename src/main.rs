use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use greenroom::devices::{DeviceInventory, DevicePlatform, DeviceRegistry, MediaAcquirer};
use greenroom::error::{DeviceAcquisitionError, SessionError, SessionResult};
use greenroom::recording::{MediaSource, Recorder, RecorderError, RecorderHandle};
use greenroom::room::{RoomCredentials, RoomId, RoomInfo, RoomService, SessionDeps};
use greenroom::voice::VoiceActivityConfig;
use greenroom::{create_router, AppState, Config, Track, TrackKind};

#[derive(Parser)]
#[command(name = "greenroom", about = "Multi-participant recording session coordinator")]
struct Args {
    /// Path to the config file (without extension)
    #[arg(short, long, default_value = "config/greenroom")]
    config: String,
}

/// In-process room backend for local/dev deployments. Production points
/// the core at the hosted room service instead.
#[derive(Default)]
struct LocalRoomService {
    rooms: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

#[async_trait]
impl RoomService for LocalRoomService {
    async fn create_room(&self, room_name: &str) -> SessionResult<RoomCredentials> {
        let raw = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
        let room_id = RoomId::parse(&raw)?;
        let created_at = Utc::now();

        let mut rooms = self.rooms.lock().await;
        rooms.insert(raw, (room_name.to_string(), created_at));

        Ok(RoomCredentials {
            room_id,
            room_name: room_name.to_string(),
            token: Uuid::new_v4().to_string(),
            issued_at: created_at,
        })
    }

    async fn join_room(&self, room_id: &RoomId) -> SessionResult<RoomCredentials> {
        let rooms = self.rooms.lock().await;
        let Some((room_name, _)) = rooms.get(room_id.as_str()) else {
            return Err(SessionError::InvalidOperation(format!(
                "unknown room: {}",
                room_id
            )));
        };

        Ok(RoomCredentials {
            room_id: room_id.clone(),
            room_name: room_name.clone(),
            token: Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
        })
    }

    async fn room_info(&self, room_id: &RoomId, _token: &str) -> SessionResult<RoomInfo> {
        let rooms = self.rooms.lock().await;
        let Some((room_name, created_at)) = rooms.get(room_id.as_str()) else {
            return Err(SessionError::InvalidOperation(format!(
                "unknown room: {}",
                room_id
            )));
        };

        Ok(RoomInfo {
            id: room_id.clone(),
            name: room_name.clone(),
            host_id: String::new(),
            participant_count: 0,
            created_at: *created_at,
            ttl_seconds: 24 * 60 * 60,
        })
    }

    async fn leave_room(&self, room_id: &RoomId, _token: &str) -> SessionResult<()> {
        info!("Local room backend: leave {}", room_id);
        Ok(())
    }
}

/// Recorder that only logs open/close. The real capture/encoding pipeline
/// is an external collaborator.
struct LogRecorder;

#[async_trait]
impl Recorder for LogRecorder {
    async fn start_recording(
        &self,
        participant_id: &str,
        source: &MediaSource,
    ) -> Result<RecorderHandle, RecorderError> {
        info!(
            "Recorder open: {} ({} track(s))",
            participant_id,
            source.track_names.len()
        );
        Ok(RecorderHandle::new())
    }

    async fn stop_recording(&self, participant_id: &str) -> Result<(), RecorderError> {
        info!("Recorder close: {}", participant_id);
        Ok(())
    }
}

/// Hands out synthetic track handles without touching real hardware.
struct PassthroughAcquirer;

#[async_trait]
impl MediaAcquirer for PassthroughAcquirer {
    async fn acquire(
        &self,
        kind: TrackKind,
        device_id: Option<&str>,
    ) -> Result<Track, DeviceAcquisitionError> {
        let name = format!(
            "{}-{}-{}",
            kind,
            device_id.unwrap_or("default"),
            Uuid::new_v4().simple()
        );
        info!("Acquired {} source {}", kind, name);
        Ok(Track::new(name, kind))
    }

    async fn release(&self, track: Track) {
        info!("Released {} source {}", track.kind, track.name);
    }
}

/// Device platform with a fixed inventory and no hot-swap events.
#[derive(Default)]
struct StaticDevices {
    holders: Mutex<Vec<mpsc::Sender<DeviceInventory>>>,
}

#[async_trait]
impl DevicePlatform for StaticDevices {
    async fn list_devices(&self) -> SessionResult<DeviceInventory> {
        Ok(DeviceInventory::default())
    }

    async fn subscribe(&self) -> SessionResult<mpsc::Receiver<DeviceInventory>> {
        let (tx, rx) = mpsc::channel(4);
        self.holders.lock().await.push(tx);
        Ok(rx)
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Signaling server: {}", cfg.signaling.url);

    let deps = SessionDeps {
        room_service: Arc::new(LocalRoomService::default()),
        recorder: Arc::new(LogRecorder),
        acquirer: Arc::new(PassthroughAcquirer),
        signaling_url: cfg.signaling.url.clone(),
        subject_prefix: cfg.signaling.subject_prefix.clone(),
        voice: VoiceActivityConfig {
            threshold: cfg.voice.threshold,
            interval: Duration::from_millis(cfg.voice.interval_ms),
        },
    };

    let registry = Arc::new(DeviceRegistry::new(Box::new(StaticDevices::default())));
    let state = AppState::new(deps, Arc::clone(&registry));

    // Fan device hot-swap events out to every active membership.
    let (changes_tx, mut changes_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(e) = registry.run(changes_tx, shutdown_rx).await {
                warn!("Device watcher stopped: {}", e);
            }
        });
    }
    {
        let sessions = Arc::clone(&state.sessions);
        tokio::spawn(async move {
            while let Some(inventory) = changes_rx.recv().await {
                let sessions = sessions.read().await;
                for handle in sessions.values() {
                    handle.notify_devices(inventory.clone()).await;
                }
            }
        });
    }

    let app = create_router(state);
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Control surface listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
