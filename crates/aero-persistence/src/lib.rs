//! Append-only reading store for aero.
//!
//! Readings are written as one JSON document per line into a daily file.
//! The relay talks to the store through the [`ReadingStore`] trait so tests
//! can swap in [`MemoryStore`].

pub mod error;
pub mod store;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use store::{BoxFuture, DynReadingStore, MemoryStore, ReadingStore};
pub use writer::{JsonLinesStore, JsonLinesWriter};
