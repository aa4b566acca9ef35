//! Progress aggregation engine.
//!
//! Metric registration, incremental delta propagation into denormalized
//! totals, chapter ordering, and study sessions.

#![warn(missing_docs)]

pub mod engine;
mod error;
pub mod outline;
pub mod session;

pub use engine::ProgressEngine;
pub use error::{ProgressError, Result};
