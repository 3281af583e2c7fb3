//! Ingest relay: persist, then rebroadcast.
//!
//! A reading reaches viewers only after the store accepted it, so the live
//! display never shows something missing from stored history.

use std::sync::Arc;
use std::time::Instant;

use aero_core::{Reading, SensorEvent};
use aero_persistence::DynReadingStore;
use aero_telemetry::Metrics;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, trace};

use crate::error::{DashboardError, DashboardResult};
use crate::viewer::Viewer;

/// Result of a single `receive` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Stored and sent to `receivers` viewers.
    Broadcast { receivers: usize },
    /// Store rejected the reading; nothing was broadcast.
    PersistFailed,
}

impl RelayOutcome {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast { .. })
    }
}

/// Persist-then-broadcast relay.
///
/// `receive` calls are serialized, so viewers see events in receipt order.
pub struct IngestRelay {
    store: DynReadingStore,
    tx: broadcast::Sender<SensorEvent>,
    capacity: usize,
    order: Mutex<()>,
    latest: RwLock<Option<Reading>>,
}

impl IngestRelay {
    pub fn new(store: DynReadingStore, broadcast_capacity: usize) -> Self {
        let capacity = broadcast_capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            store,
            tx,
            capacity,
            order: Mutex::new(()),
            latest: RwLock::new(None),
        }
    }

    /// Convenience for sharing across connection tasks.
    pub fn shared(store: DynReadingStore, broadcast_capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(store, broadcast_capacity))
    }

    /// Handle one inbound event.
    pub async fn receive(&self, event: SensorEvent) -> RelayOutcome {
        let _order = self.order.lock().await;

        let reading = Reading::from_event(&event, Utc::now());
        let started = Instant::now();
        let saved = self.store.save(reading.clone()).await;
        Metrics::persist_latency(
            self.store.name(),
            started.elapsed().as_secs_f64() * 1000.0,
        );

        if let Err(e) = saved {
            error!(
                error = %e,
                store = self.store.name(),
                temperature = reading.temperature,
                humidity = reading.humidity,
                "Error saving reading, not broadcasting"
            );
            Metrics::reading_persist_failed();
            return RelayOutcome::PersistFailed;
        }

        *self.latest.write() = Some(reading);

        let receivers = match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!("No viewers connected");
                0
            }
        };
        Metrics::reading_broadcast(receivers);
        debug!(receivers, "Reading broadcast");

        RelayOutcome::Broadcast { receivers }
    }

    /// Attach a new viewer with its own live window.
    ///
    /// The viewer sees only events broadcast after this call. The window may
    /// not exceed the broadcast capacity: a lagging viewer only skips events
    /// older than the last `capacity`, which must all fit in its window.
    pub fn viewer(&self, live_window: usize) -> DashboardResult<Viewer> {
        self.check_window(live_window)?;
        Viewer::new(self.tx.subscribe(), live_window)
    }

    /// Reject a live window larger than the broadcast capacity.
    pub fn check_window(&self, live_window: usize) -> DashboardResult<()> {
        if live_window > self.capacity {
            return Err(DashboardError::WindowExceedsCapacity {
                window: live_window,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn broadcast_capacity(&self) -> usize {
        self.capacity
    }

    /// Last reading that was successfully stored.
    pub fn latest(&self) -> Option<Reading> {
        self.latest.read().clone()
    }

    /// Currently attached viewers.
    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for IngestRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestRelay")
            .field("store", &self.store.name())
            .field("capacity", &self.capacity)
            .field("viewers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aero_core::DEFAULT_LIVE_WINDOW;
    use aero_persistence::MemoryStore;

    fn relay_with_store() -> (Arc<MemoryStore>, Arc<IngestRelay>) {
        let store = Arc::new(MemoryStore::new());
        let relay = IngestRelay::shared(store.clone(), 64);
        (store, relay)
    }

    #[tokio::test]
    async fn test_success_persists_then_reaches_every_viewer() {
        let (store, relay) = relay_with_store();
        let mut first = relay.viewer(DEFAULT_LIVE_WINDOW).unwrap();
        let mut second = relay.viewer(DEFAULT_LIVE_WINDOW).unwrap();

        let event = SensorEvent::new(20.0, 50.0);
        let outcome = relay.receive(event.clone()).await;

        assert_eq!(outcome, RelayOutcome::Broadcast { receivers: 2 });
        assert_eq!(store.len(), 1);
        assert_eq!(first.next_event().await, Some(event.clone()));
        assert_eq!(second.next_event().await, Some(event.clone()));
        assert_eq!(first.readings().to_vec(), vec![event.clone()]);
        assert_eq!(second.readings().to_vec(), vec![event]);
    }

    #[tokio::test]
    async fn test_failed_save_is_not_broadcast() {
        let (store, relay) = relay_with_store();
        let mut viewer = relay.viewer(DEFAULT_LIVE_WINDOW).unwrap();

        store.set_failing(true);
        let lost = SensorEvent::new(99.0, 99.0);
        assert_eq!(relay.receive(lost.clone()).await, RelayOutcome::PersistFailed);
        assert_eq!(viewer.drain_pending(), 0);
        assert!(relay.latest().is_none());

        // Relay keeps going after a failure.
        store.set_failing(false);
        let kept = SensorEvent::new(21.0, 51.0);
        assert!(relay.receive(kept.clone()).await.is_broadcast());
        assert_eq!(viewer.drain_pending(), 1);
        assert_eq!(viewer.readings().to_vec(), vec![kept]);
        assert!(!viewer.readings().iter().any(|e| *e == lost));
    }

    #[tokio::test]
    async fn test_broadcast_is_raw_payload_not_stored_record() {
        let (store, relay) = relay_with_store();
        let mut viewer = relay.viewer(DEFAULT_LIVE_WINDOW).unwrap();

        let event: SensorEvent =
            serde_json::from_str(r#"{"temperature":20,"humidity":50,"sensor":"sht31"}"#).unwrap();
        relay.receive(event.clone()).await;

        let received = viewer.next_event().await.unwrap();
        assert_eq!(received.payload(), event.payload());
        assert!(received.payload().get("timestamp").is_none());
        // The stored record got a defaulted timestamp instead.
        assert_eq!(store.saved()[0].temperature, 20.0);
    }

    #[tokio::test]
    async fn test_no_viewers_still_persists() {
        let (store, relay) = relay_with_store();
        let outcome = relay.receive(SensorEvent::new(20.0, 50.0)).await;
        assert_eq!(outcome, RelayOutcome::Broadcast { receivers: 0 });
        assert_eq!(store.len(), 1);
        assert_eq!(relay.latest().map(|r| r.humidity), Some(50.0));
    }

    #[tokio::test]
    async fn test_concurrent_receives_keep_store_and_broadcast_order_aligned() {
        let (store, relay) = relay_with_store();
        let mut viewer = relay.viewer(DEFAULT_LIVE_WINDOW).unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let relay = relay.clone();
                tokio::spawn(async move { relay.receive(SensorEvent::new(f64::from(i), 50.0)).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_broadcast());
        }

        assert_eq!(viewer.drain_pending(), 20);
        let broadcast_order: Vec<f64> = viewer.readings().iter().map(|e| e.temperature()).collect();
        let stored_order: Vec<f64> = store.saved().iter().map(|r| r.temperature).collect();
        assert_eq!(broadcast_order, stored_order);
    }

    #[test]
    fn test_window_larger_than_capacity_rejected() {
        let relay = IngestRelay::new(Arc::new(MemoryStore::new()), 4);
        let err = relay.viewer(DEFAULT_LIVE_WINDOW).unwrap_err();
        assert!(matches!(
            err,
            DashboardError::WindowExceedsCapacity {
                window: 50,
                capacity: 4
            }
        ));
        assert!(relay.viewer(4).is_ok());
    }

    #[tokio::test]
    async fn test_lagging_viewer_window_matches_stored_tail() {
        let store = Arc::new(MemoryStore::new());
        let relay = IngestRelay::new(store.clone(), 4);
        let mut viewer = relay.viewer(4).unwrap();

        for i in 0..10 {
            assert!(relay.receive(SensorEvent::new(f64::from(i), 50.0)).await.is_broadcast());
        }

        // Six readings were overwritten before the viewer caught up.
        assert_eq!(viewer.drain_pending(), 4);
        let window: Vec<f64> = viewer.readings().iter().map(|e| e.temperature()).collect();
        let stored_tail: Vec<f64> = store.saved()[6..].iter().map(|r| r.temperature).collect();
        assert_eq!(window, stored_tail);
    }
}
