//! Per-connection viewer state.

use aero_core::{LiveBuffer, SensorEvent};
use aero_telemetry::Metrics;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::error::DashboardResult;

/// One connected viewer: a broadcast subscription plus its live window.
///
/// Owned by a single connection task and never shared.
#[derive(Debug)]
pub struct Viewer {
    rx: broadcast::Receiver<SensorEvent>,
    buffer: LiveBuffer<SensorEvent>,
}

impl Viewer {
    pub fn new(rx: broadcast::Receiver<SensorEvent>, live_window: usize) -> DashboardResult<Self> {
        Ok(Self {
            rx,
            buffer: LiveBuffer::try_with_capacity(live_window)?,
        })
    }

    /// Wait for the next broadcast event and append it to the window.
    ///
    /// Returns `None` once the relay is gone.
    pub async fn next_event(&mut self) -> Option<SensorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    self.buffer.push(event.clone());
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Viewer lagged, skipping to newer readings");
                    Metrics::viewer_lagged(skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    return None;
                }
            }
        }
    }

    /// Apply every event already queued without waiting.
    ///
    /// Returns how many were appended.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.buffer.push(event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Viewer lagged, skipping to newer readings");
                    Metrics::viewer_lagged(skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return applied,
            }
        }
    }

    /// Current window, oldest first.
    pub fn readings(&self) -> &LiveBuffer<SensorEvent> {
        &self.buffer
    }
}
