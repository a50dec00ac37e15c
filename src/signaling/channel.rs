use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::messages::SignalingMessage;
use crate::error::{SessionError, SessionResult};

/// Connection state of the signaling channel.
///
/// Reconnection is owned by the embedding collaborator; the core only
/// observes transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Outgoing half of a control-plane connection. The NATS-backed
/// [`SignalingChannel`] is the production implementation; tests use an
/// in-memory double.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Publish a control message to the room.
    async fn send(&self, message: &SignalingMessage) -> SessionResult<()>;

    /// Watch connection-state transitions.
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Close the connection. Best-effort.
    async fn close(self: Box<Self>);
}

/// Control-plane channel for one room membership.
///
/// Wraps a NATS connection with one subject per room. Incoming messages are
/// parsed off the wire and forwarded in delivery order to a bounded queue;
/// messages of unknown shape are dropped with a diagnostic. The channel
/// guarantees FIFO order for messages it received but nothing across
/// participants.
pub struct SignalingChannel {
    client: Client,
    subject: String,
    state_tx: watch::Sender<ConnectionState>,
    reader_handle: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    /// Connect to the signaling server and subscribe to the room's control
    /// subject. Returns the channel and the receiver the reader task feeds.
    pub async fn connect(
        url: &str,
        subject_prefix: &str,
        room_id: &str,
    ) -> Result<(Self, mpsc::Receiver<SignalingMessage>)> {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);

        info!("Connecting to signaling server at {}", url);

        let client = match async_nats::connect(url).await {
            Ok(client) => client,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Failed);
                return Err(e).context("Failed to connect to signaling server");
            }
        };

        let subject = format!("{}.{}.control", subject_prefix, room_id);

        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to room control subject")?;

        state_tx.send_replace(ConnectionState::Open);
        info!("Signaling channel open on {}", subject);

        let (event_tx, event_rx) = mpsc::channel(256);
        let reader_state = state_tx.clone();

        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<SignalingMessage>(&msg.payload) {
                    Ok(message) => {
                        if event_tx.send(message).await.is_err() {
                            // Consumer is gone; the room is being torn down.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping signaling message of unknown shape: {}", e);
                    }
                }
            }

            reader_state.send_replace(ConnectionState::Closed);
            info!("Signaling reader stopped");
        });

        Ok((
            Self {
                client,
                subject,
                state_tx,
                reader_handle: Some(reader_handle),
            },
            event_rx,
        ))
    }
}

#[async_trait]
impl ControlChannel for SignalingChannel {
    async fn send(&self, message: &SignalingMessage) -> SessionResult<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| {
                self.state_tx.send_replace(ConnectionState::Failed);
                SessionError::Transport(format!("publish failed: {}", e))
            })?;

        Ok(())
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Close the channel. Best-effort: the reader task is aborted and the
    /// state is marked closed even if the flush fails.
    async fn close(mut self: Box<Self>) {
        info!("Closing signaling channel on {}", self.subject);

        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }

        if let Err(e) = self.client.flush().await {
            warn!("Failed to flush signaling connection: {}", e);
        }

        self.state_tx.send_replace(ConnectionState::Closed);
    }
}
