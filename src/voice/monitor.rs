use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Tuning for the voice-activity decision.
///
/// Threshold and period are deliberately plain constants with no
/// hysteresis; borderline audio levels can flicker between speaking and
/// not-speaking.
#[derive(Debug, Clone)]
pub struct VoiceActivityConfig {
    /// Mean spectrum magnitude (0-255 scale) above which the local
    /// participant counts as speaking.
    pub threshold: f32,
    /// Sampling period. Analysis is throttled to this period even when the
    /// capture source offers spectra faster.
    pub interval: Duration,
}

impl Default for VoiceActivityConfig {
    fn default() -> Self {
        Self {
            threshold: 25.0,
            interval: Duration::from_millis(100),
        }
    }
}

/// One frequency-domain snapshot of the local audio track.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Magnitude per frequency bin, 0-255.
    pub bins: Vec<u8>,
}

/// Mean magnitude across all frequency bins.
pub fn mean_magnitude(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().map(|&b| b as u32).sum::<u32>() as f32 / bins.len() as f32
}

/// Periodic analyzer for the local audio track.
///
/// Remote speaking state arrives over signaling; only the local track is
/// analyzed here. The monitor samples the newest available spectrum once
/// per period and emits a signal whenever the speaking decision changes.
/// The gate reflects whether the local audio track is live; sampling stops
/// within one period of the gate closing, so a disabled or replaced track
/// never reports stale speaking state.
pub struct VoiceActivityMonitor {
    config: VoiceActivityConfig,
}

impl VoiceActivityMonitor {
    pub fn new(config: VoiceActivityConfig) -> Self {
        Self { config }
    }

    /// Run until the frame source ends or shutdown is signalled.
    pub async fn run(
        self,
        mut frames: mpsc::Receiver<SpectrumFrame>,
        gate: watch::Receiver<bool>,
        speaking_tx: mpsc::Sender<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut speaking = false;
        let mut latest: Option<SpectrumFrame> = None;
        let mut source_open = true;

        info!(
            "Voice activity monitor started (threshold {}, period {:?})",
            self.config.threshold, self.config.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Keep only the newest frame per period.
                    loop {
                        match frames.try_recv() {
                            Ok(frame) => latest = Some(frame),
                            Err(mpsc::error::TryRecvError::Empty) => break,
                            Err(mpsc::error::TryRecvError::Disconnected) => {
                                source_open = false;
                                break;
                            }
                        }
                    }

                    if !*gate.borrow() {
                        latest = None;
                        if speaking {
                            speaking = false;
                            if speaking_tx.send(false).await.is_err() {
                                break;
                            }
                        }
                        if !source_open {
                            break;
                        }
                        continue;
                    }

                    if let Some(frame) = latest.take() {
                        let level = mean_magnitude(&frame.bins);
                        let now_speaking = level > self.config.threshold;
                        if now_speaking != speaking {
                            debug!("Voice activity: level {:.1} -> speaking={}", level, now_speaking);
                            speaking = now_speaking;
                            if speaking_tx.send(now_speaking).await.is_err() {
                                break;
                            }
                        }
                    }

                    if !source_open {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped controller counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Voice activity monitor stopped");
    }
}
