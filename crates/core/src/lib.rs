//! StudyTrack core data models.
//!
//! This crate defines the fundamental data structures for course progress
//! tracking: courses with nested chapters, typed metrics, and the
//! denormalized aggregates that hold their running totals.

#![warn(missing_docs)]

// Core identities
mod id;

// Courses and chapters
mod course;
mod trackable;

// Metric type library
mod metric;
mod registry;

// Progress aggregation records
mod progress;
mod session;

// Re-exports
pub use id::*;

// Course & Chapter
pub use course::{Chapter, Course};
pub use trackable::TrackableRef;

// Metric types
pub use metric::{MetricError, MetricKind, MetricValue};
pub use registry::{resolve, ResolvedKind};

// Progress records & aggregates
pub use progress::{
    AchievementMetric, AchievementRecord, CourseMetric, MetricDefinition, ProgressInstance,
};
pub use session::{AchievementChange, StudySession};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
