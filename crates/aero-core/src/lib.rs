//! Core domain types for the aero sensor dashboard.
//!
//! This crate provides the types shared by every other crate:
//! - `SensorEvent`: Inbound payload pushed by a device, echoed verbatim to viewers
//! - `Reading`: Normalized record persisted to the document store
//! - `LiveBuffer`: Bounded most-recent-N window kept by each viewer

pub mod error;
pub mod live_buffer;
pub mod reading;

pub use error::{CoreError, Result};
pub use live_buffer::{LiveBuffer, DEFAULT_LIVE_WINDOW};
pub use reading::{vapour_pressure_deficit, Reading, SensorEvent};
