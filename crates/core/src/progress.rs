//! Progress aggregation records.
//!
//! Two layers of denormalized running totals sit over the leaf records:
//!
//! ```text
//! CourseMetric.total        == sum of its ProgressInstance.value
//! AchievementMetric.total   == sum of its AchievementRecord.value
//! ```
//!
//! Totals are never recomputed on the hot path; every leaf mutation applies
//! a signed delta to its parent through the engine's delta routine. The
//! types here only hold the state; the engine owns the invariants.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{
    AchievementId, AchievementMetricId, CourseId, CourseMetricId, MetricId, ProgressId,
};
use crate::metric::MetricKind;
use crate::trackable::TrackableRef;
use crate::Time;

/// A named, typed metric. Immutable once created; scoped to one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique identifier
    pub id: MetricId,

    /// Course this definition belongs to
    pub course_id: CourseId,

    /// Metric name, unique within the course
    pub name: String,

    /// Measurement kind
    pub kind: MetricKind,

    /// Created at
    pub created_at: Time,
}

impl MetricDefinition {
    /// Create a new definition.
    pub fn new(course_id: CourseId, name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: MetricId::new(),
            course_id,
            name: name.into(),
            kind,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Per-course running total for one metric, across all progress instances.
///
/// The `metric_id` reference is fixed for the aggregate's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseMetric {
    /// Unique identifier
    pub id: CourseMetricId,

    /// Owning course
    pub course_id: CourseId,

    /// The metric this aggregate totals
    pub metric_id: MetricId,

    /// Denormalized running total
    pub total: Decimal,
}

impl CourseMetric {
    /// Create a fresh aggregate with a zero total.
    pub fn new(course_id: CourseId, metric_id: MetricId) -> Self {
        Self {
            id: CourseMetricId::new(),
            course_id,
            metric_id,
            total: Decimal::ZERO,
        }
    }
}

/// Per-course running total for one achievement level of one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementMetric {
    /// Unique identifier
    pub id: AchievementMetricId,

    /// Parent course metric aggregate
    pub course_metric_id: CourseMetricId,

    /// Level name ("Done", "Summarized", ...), unique within the course metric
    pub achievement_level: String,

    /// Weight in `[0, 100]`
    pub weight: u8,

    /// Estimated time to reach this level per unit of progress
    pub time_estimate: Option<Duration>,

    /// Denormalized running total
    pub total: Decimal,
}

impl AchievementMetric {
    /// Create a fresh achievement aggregate with a zero total.
    pub fn new(
        course_metric_id: CourseMetricId,
        achievement_level: impl Into<String>,
        weight: u8,
        time_estimate: Option<Duration>,
    ) -> Self {
        Self {
            id: AchievementMetricId::new(),
            course_metric_id,
            achievement_level: achievement_level.into(),
            weight,
            time_estimate,
            total: Decimal::ZERO,
        }
    }
}

/// Leaf record: measured progress against one trackable entity for one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInstance {
    /// Unique identifier
    pub id: ProgressId,

    /// The entity the progress is recorded against
    pub target: TrackableRef,

    /// Parent course metric aggregate
    pub course_metric_id: CourseMetricId,

    /// Measured value, non-negative
    pub value: Decimal,
}

impl ProgressInstance {
    /// Create a zero-valued instance.
    pub fn new(target: TrackableRef, course_metric_id: CourseMetricId) -> Self {
        Self {
            id: ProgressId::new(),
            target,
            course_metric_id,
            value: Decimal::ZERO,
        }
    }
}

/// Leaf record: achievement reached within a progress instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementRecord {
    /// Unique identifier
    pub id: AchievementId,

    /// The progress instance this achievement belongs to
    pub progress_id: ProgressId,

    /// Parent achievement aggregate
    pub achievement_metric_id: AchievementMetricId,

    /// Achieved value, non-negative
    pub value: Decimal,

    /// When the value was last raised
    pub achieved_at: Option<Time>,
}

impl AchievementRecord {
    /// Create a zero-valued record.
    pub fn new(progress_id: ProgressId, achievement_metric_id: AchievementMetricId) -> Self {
        Self {
            id: AchievementId::new(),
            progress_id,
            achievement_metric_id,
            value: Decimal::ZERO,
            achieved_at: None,
        }
    }
}
