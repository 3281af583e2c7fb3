//! Reading store trait.
//!
//! The store is the only collaborator the relay awaits. A save either
//! completes or fails; there is no partial write to roll back.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aero_core::Reading;
use parking_lot::Mutex;

use crate::error::{PersistenceError, PersistenceResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Append-only store of readings.
pub trait ReadingStore: Send + Sync {
    /// Persist one reading.
    fn save(&self, reading: Reading) -> BoxFuture<'_, PersistenceResult<()>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Arc wrapper for ReadingStore trait objects.
pub type DynReadingStore = Arc<dyn ReadingStore>;

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<Reading>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Readings saved so far, in save order.
    pub fn saved(&self) -> Vec<Reading> {
        self.saved.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.lock().is_empty()
    }
}

impl ReadingStore for MemoryStore {
    fn save(&self, reading: Reading) -> BoxFuture<'_, PersistenceResult<()>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::Unavailable(
                    "memory store set to fail".to_string(),
                ));
            }
            self.saved.lock().push(reading);
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
