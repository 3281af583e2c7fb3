//! Bounded most-recent-N window.
//!
//! Each viewer keeps one of these over the readings it has been sent.
//! Appending past capacity evicts from the front, so the contents are always
//! the last `capacity` items in arrival order (most recent last).

use std::collections::VecDeque;

use crate::error::{CoreError, Result};

/// Default number of readings kept per viewer.
pub const DEFAULT_LIVE_WINDOW: usize = 50;

/// Bounded FIFO over the most recently received items.
#[derive(Debug, Clone)]
pub struct LiveBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for LiveBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LiveBuffer<T> {
    /// Create an empty buffer with the default window of 50.
    pub fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(DEFAULT_LIVE_WINDOW + 1),
            capacity: DEFAULT_LIVE_WINDOW,
        }
    }

    /// Create an empty buffer with a custom window.
    ///
    /// A zero capacity would discard every item, so it is rejected.
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity(capacity));
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
        })
    }

    /// Append an item, evicting the oldest entries past capacity.
    ///
    /// Returns the number of evicted items.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Iterate from oldest to most recent.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    /// Most recently received item.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> LiveBuffer<T> {
    /// Copy the current contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Extend<T> for LiveBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}
