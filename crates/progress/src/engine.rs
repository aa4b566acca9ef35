//! Progress aggregation engine.
//!
//! Holds the two layers of denormalized totals consistent:
//!
//! - a course metric total always equals the sum of its progress instances,
//! - an achievement metric total always equals the sum of its records.
//!
//! Every mutation of a leaf value goes through a single delta routine:
//! compute `new - old`, apply the signed delta to the parent aggregate,
//! persist the parent, then persist the leaf. Totals are never recomputed on
//! the hot path; [`ProgressEngine::recompute_course_metric_total`] is the
//! full-scan repair fallback.
//!
//! All operations lock the backend for their whole read-modify-write span,
//! so concurrent writers touching the same aggregate are serialized.

use rust_decimal::Decimal;
use studytrack_core::{
    AchievementId, AchievementMetric, AchievementMetricId, AchievementRecord, Course, CourseId,
    CourseMetric, CourseMetricId, MetricDefinition, MetricId, MetricKind, MetricValue,
    ProgressId, ProgressInstance, TrackableRef, UserId,
};
use studytrack_storage::Storage;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ProgressError, Result};

/// The aggregation engine. Serializes all mutations through a single lock
/// over the storage backend.
pub struct ProgressEngine<S: Storage> {
    pub(crate) storage: Mutex<S>,
}

impl<S: Storage> ProgressEngine<S> {
    /// Create an engine over a storage backend.
    pub fn new(storage: S) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    /// Consume the engine and return the backend.
    pub fn into_inner(self) -> S {
        self.storage.into_inner()
    }

    // === Course registration ===

    /// Create a course.
    pub async fn create_course(&self, owner: UserId, title: impl Into<String>) -> Result<Course> {
        let mut storage = self.storage.lock().await;
        let course = Course::new(owner, title);
        let out = storage
            .save_course(&course)
            .await
            .map_err(ProgressError::from)
            .map(|_| course);
        finish(&mut *storage, "create course", out).await
    }

    /// Delete a course and everything it owns: chapters, metric definitions,
    /// aggregates, progress instances, and achievement records.
    pub async fn delete_course(&self, course_id: CourseId) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let out = delete_course_rows(&mut *storage, course_id).await;
        finish(&mut *storage, "delete course", out).await
    }

    /// Mark a course completed. The completion timestamp is only stamped
    /// on the first call.
    pub async fn complete_course(&self, course_id: CourseId) -> Result<Course> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let mut course = require_course(&*storage, course_id).await?;
            course.complete();
            storage.save_course(&course).await?;
            Ok(course)
        }
        .await;
        finish(&mut *storage, "complete course", out).await
    }

    /// Bump the course's modified timestamp. Invoked by every chapter and
    /// metric mutation path; also callable directly.
    pub async fn touch_course(&self, course_id: CourseId) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let out = touch_course(&mut *storage, course_id).await;
        finish(&mut *storage, "touch course", out).await
    }

    // === Metric registration ===

    /// Create an immutable metric definition scoped to a course. The
    /// definition name is unique within the course.
    pub async fn create_metric_definition(
        &self,
        course_id: CourseId,
        name: impl Into<String>,
        kind: MetricKind,
    ) -> Result<MetricDefinition> {
        let mut storage = self.storage.lock().await;
        let name = name.into();
        let out = async {
            require_course(&*storage, course_id).await?;
            let existing = storage.list_metric_definitions(course_id).await?;
            if existing.iter().any(|d| d.name == name) {
                return Err(ProgressError::Conflict(format!(
                    "metric '{name}' already defined for this course"
                )));
            }
            let definition = MetricDefinition::new(course_id, name, kind);
            storage.save_metric_definition(&definition).await?;
            info!(metric = %definition.id, kind = %kind, "created metric definition");
            Ok(definition)
        }
        .await;
        finish(&mut *storage, "create metric definition", out).await
    }

    /// Register a course metric aggregate for a definition, starting at a
    /// zero total. One aggregate per (course, definition).
    pub async fn register_course_metric(
        &self,
        course_id: CourseId,
        metric_id: MetricId,
    ) -> Result<CourseMetric> {
        let mut storage = self.storage.lock().await;
        let out = async {
            require_course(&*storage, course_id).await?;
            let definition = require_definition(&*storage, metric_id).await?;
            if definition.course_id != course_id {
                return Err(ProgressError::AggregateConsistency(
                    "metric definition belongs to another course".to_string(),
                ));
            }
            let registered = storage.list_course_metrics(course_id).await?;
            if registered.iter().any(|m| m.metric_id == metric_id) {
                return Err(ProgressError::Conflict(format!(
                    "metric '{}' already registered for this course",
                    definition.name
                )));
            }
            let metric = CourseMetric::new(course_id, metric_id);
            storage.save_course_metric(&metric).await?;
            touch_course(&mut *storage, course_id).await?;
            info!(course_metric = %metric.id, "registered course metric");
            Ok(metric)
        }
        .await;
        finish(&mut *storage, "register course metric", out).await
    }

    /// Add an achievement level aggregate under a course metric. The level
    /// name is unique within the course metric; weight is bounded to
    /// `[0, 100]`.
    pub async fn add_achievement_metric(
        &self,
        course_metric_id: CourseMetricId,
        achievement_level: impl Into<String>,
        weight: u8,
        time_estimate: Option<std::time::Duration>,
    ) -> Result<AchievementMetric> {
        let mut storage = self.storage.lock().await;
        let level = achievement_level.into();
        let out = async {
            if weight > 100 {
                return Err(ProgressError::AggregateConsistency(format!(
                    "weight must be in [0, 100], got {weight}"
                )));
            }
            let course_metric = require_course_metric(&*storage, course_metric_id).await?;
            let siblings = storage.list_achievement_metrics(course_metric_id).await?;
            if siblings.iter().any(|m| m.achievement_level == level) {
                return Err(ProgressError::Conflict(format!(
                    "achievement level '{level}' already exists for this metric"
                )));
            }
            let metric =
                AchievementMetric::new(course_metric_id, level, weight, time_estimate);
            storage.save_achievement_metric(&metric).await?;
            touch_course(&mut *storage, course_metric.course_id).await?;
            Ok(metric)
        }
        .await;
        finish(&mut *storage, "add achievement metric", out).await
    }

    // === Leaf mutations ===

    /// Record (or update) the progress value for a trackable entity under a
    /// course metric. A `None` value is treated as zero. The signed delta
    /// `new - old` is applied to the course metric total before the leaf is
    /// persisted.
    pub async fn upsert_progress_value(
        &self,
        target: TrackableRef,
        course_metric_id: CourseMetricId,
        value: Option<Decimal>,
    ) -> Result<ProgressInstance> {
        let mut storage = self.storage.lock().await;
        let out = upsert_progress_rows(&mut *storage, target, course_metric_id, value).await;
        finish(&mut *storage, "upsert progress value", out).await
    }

    /// Delete a progress instance. Equivalent to setting its value to zero
    /// first: the course metric total is decremented by the old value, and
    /// attached achievement records cascade the same way.
    pub async fn remove_progress(&self, progress_id: ProgressId) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let instance = require_progress(&*storage, progress_id).await?;
            let course_metric =
                require_course_metric(&*storage, instance.course_metric_id).await?;
            remove_progress_rows(&mut *storage, &instance).await?;
            touch_course(&mut *storage, course_metric.course_id).await?;
            Ok(())
        }
        .await;
        finish(&mut *storage, "remove progress", out).await
    }

    /// Record (or update) the achievement value for one level of a progress
    /// instance. Validates that the achievement metric and the progress
    /// instance share a course metric, and that the instance's achievement
    /// values never sum past its progress value.
    pub async fn upsert_achievement_value(
        &self,
        progress_id: ProgressId,
        achievement_metric_id: AchievementMetricId,
        value: Option<Decimal>,
    ) -> Result<AchievementRecord> {
        let mut storage = self.storage.lock().await;
        let out = upsert_achievement_rows(
            &mut *storage,
            progress_id,
            achievement_metric_id,
            value.unwrap_or(Decimal::ZERO),
        )
        .await;
        finish(&mut *storage, "upsert achievement value", out).await
    }

    /// Delete an achievement record, decrementing its aggregate first.
    pub async fn remove_achievement(&self, achievement_id: AchievementId) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let record = storage
                .load_achievement(achievement_id)
                .await?
                .ok_or_else(|| {
                    ProgressError::NotFound(format!("achievement record {achievement_id}"))
                })?;
            let metric =
                apply_achievement_delta(&mut *storage, record.achievement_metric_id, -record.value)
                    .await?;
            storage.delete_achievement(record.id).await?;
            let course_metric =
                require_course_metric(&*storage, metric.course_metric_id).await?;
            touch_course(&mut *storage, course_metric.course_id).await?;
            Ok(())
        }
        .await;
        finish(&mut *storage, "remove achievement", out).await
    }

    // === Totals ===

    /// Trusted cached read of a course metric total.
    pub async fn course_metric_total(&self, id: CourseMetricId) -> Result<Decimal> {
        let storage = self.storage.lock().await;
        Ok(require_course_metric(&*storage, id).await?.total)
    }

    /// Trusted cached read of an achievement metric total.
    pub async fn achievement_metric_total(&self, id: AchievementMetricId) -> Result<Decimal> {
        let storage = self.storage.lock().await;
        Ok(require_achievement_metric(&*storage, id).await?.total)
    }

    /// The cached course metric total converted through the metric kind.
    pub async fn typed_total(&self, id: CourseMetricId) -> Result<MetricValue> {
        let storage = self.storage.lock().await;
        let metric = require_course_metric(&*storage, id).await?;
        let definition = require_definition(&*storage, metric.metric_id).await?;
        Ok(definition.kind.get(metric.total)?)
    }

    /// Authoritative full-scan recomputation of a course metric total.
    /// Repair/audit path only, never the steady state.
    pub async fn recompute_course_metric_total(&self, id: CourseMetricId) -> Result<Decimal> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let mut metric = require_course_metric(&*storage, id).await?;
            let actual: Decimal = storage
                .list_progress(id)
                .await?
                .iter()
                .map(|p| p.value)
                .sum();
            if actual != metric.total {
                warn!(
                    course_metric = %id,
                    stored = %metric.total,
                    actual = %actual,
                    "course metric total drifted, repairing"
                );
                metric.total = actual;
                storage.save_course_metric(&metric).await?;
            }
            Ok(actual)
        }
        .await;
        finish(&mut *storage, "recompute course metric total", out).await
    }

    /// Authoritative full-scan recomputation of an achievement metric total.
    pub async fn recompute_achievement_metric_total(
        &self,
        id: AchievementMetricId,
    ) -> Result<Decimal> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let mut metric = require_achievement_metric(&*storage, id).await?;
            let actual: Decimal = storage
                .list_achievements(id)
                .await?
                .iter()
                .map(|a| a.value)
                .sum();
            if actual != metric.total {
                warn!(
                    achievement_metric = %id,
                    stored = %metric.total,
                    actual = %actual,
                    "achievement metric total drifted, repairing"
                );
                metric.total = actual;
                storage.save_achievement_metric(&metric).await?;
            }
            Ok(actual)
        }
        .await;
        finish(&mut *storage, "recompute achievement metric total", out).await
    }
}

// === Shared row-level routines ===
//
// These are the only code paths allowed to change an aggregate's total.

/// Commit on success, roll back on failure.
pub(crate) async fn finish<S: Storage, T>(
    storage: &mut S,
    message: &str,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            storage.commit(message).await?;
            Ok(value)
        }
        Err(e) => {
            storage.rollback().await?;
            Err(e)
        }
    }
}

pub(crate) async fn require_course<S: Storage>(storage: &S, id: CourseId) -> Result<Course> {
    storage
        .load_course(id)
        .await?
        .ok_or_else(|| ProgressError::NotFound(format!("course {id}")))
}

pub(crate) async fn require_definition<S: Storage>(
    storage: &S,
    id: MetricId,
) -> Result<MetricDefinition> {
    storage
        .load_metric_definition(id)
        .await?
        .ok_or_else(|| ProgressError::NotFound(format!("metric definition {id}")))
}

pub(crate) async fn require_course_metric<S: Storage>(
    storage: &S,
    id: CourseMetricId,
) -> Result<CourseMetric> {
    storage
        .load_course_metric(id)
        .await?
        .ok_or_else(|| ProgressError::NotFound(format!("course metric {id}")))
}

pub(crate) async fn require_achievement_metric<S: Storage>(
    storage: &S,
    id: AchievementMetricId,
) -> Result<AchievementMetric> {
    storage
        .load_achievement_metric(id)
        .await?
        .ok_or_else(|| ProgressError::NotFound(format!("achievement metric {id}")))
}

pub(crate) async fn require_progress<S: Storage>(
    storage: &S,
    id: ProgressId,
) -> Result<ProgressInstance> {
    storage
        .load_progress(id)
        .await?
        .ok_or_else(|| ProgressError::NotFound(format!("progress instance {id}")))
}

pub(crate) async fn touch_course<S: Storage>(storage: &mut S, course_id: CourseId) -> Result<()> {
    let mut course = require_course(&*storage, course_id).await?;
    course.touch();
    storage.save_course(&course).await?;
    Ok(())
}

/// Resolve a polymorphic target to the course that owns it.
pub(crate) async fn resolve_owning_course<S: Storage>(
    storage: &S,
    target: TrackableRef,
) -> Result<CourseId> {
    match target {
        TrackableRef::Course(id) => Ok(require_course(storage, id).await?.id),
        TrackableRef::Chapter(id) => Ok(storage
            .load_chapter(id)
            .await?
            .ok_or_else(|| ProgressError::NotFound(format!("chapter {id}")))?
            .course_id),
    }
}

/// Apply a signed delta to a course metric total and persist it.
pub(crate) async fn apply_course_delta<S: Storage>(
    storage: &mut S,
    id: CourseMetricId,
    delta: Decimal,
) -> Result<CourseMetric> {
    let mut metric = require_course_metric(&*storage, id).await?;
    let next = metric.total + delta;
    if next < Decimal::ZERO {
        return Err(ProgressError::AggregateConsistency(format!(
            "course metric total would go negative: total {} delta {}",
            metric.total, delta
        )));
    }
    metric.total = next;
    storage.save_course_metric(&metric).await?;
    debug!(course_metric = %id, %delta, total = %metric.total, "applied course delta");
    Ok(metric)
}

/// Apply a signed delta to an achievement metric total and persist it.
pub(crate) async fn apply_achievement_delta<S: Storage>(
    storage: &mut S,
    id: AchievementMetricId,
    delta: Decimal,
) -> Result<AchievementMetric> {
    let mut metric = require_achievement_metric(&*storage, id).await?;
    let next = metric.total + delta;
    if next < Decimal::ZERO {
        return Err(ProgressError::AggregateConsistency(format!(
            "achievement metric total would go negative: total {} delta {}",
            metric.total, delta
        )));
    }
    metric.total = next;
    storage.save_achievement_metric(&metric).await?;
    debug!(achievement_metric = %id, %delta, total = %metric.total, "applied achievement delta");
    Ok(metric)
}

pub(crate) async fn find_progress<S: Storage>(
    storage: &S,
    course_metric_id: CourseMetricId,
    target: TrackableRef,
) -> Result<Option<ProgressInstance>> {
    Ok(storage
        .list_progress(course_metric_id)
        .await?
        .into_iter()
        .find(|p| p.target == target))
}

pub(crate) async fn upsert_progress_rows<S: Storage>(
    storage: &mut S,
    target: TrackableRef,
    course_metric_id: CourseMetricId,
    value: Option<Decimal>,
) -> Result<ProgressInstance> {
    let metric = require_course_metric(&*storage, course_metric_id).await?;
    let definition = require_definition(&*storage, metric.metric_id).await?;

    // Absent means zero.
    let new_value = value.unwrap_or(Decimal::ZERO);
    definition.kind.get(new_value)?;

    let owner = resolve_owning_course(&*storage, target).await?;
    if owner != metric.course_id {
        return Err(ProgressError::AggregateConsistency(
            "target does not belong to the metric's course".to_string(),
        ));
    }

    let mut instance = find_progress(&*storage, course_metric_id, target)
        .await?
        .unwrap_or_else(|| ProgressInstance::new(target, course_metric_id));
    let delta = new_value - instance.value;

    // Parent first, then the leaf.
    if delta != Decimal::ZERO {
        apply_course_delta(storage, course_metric_id, delta).await?;
    }
    instance.value = new_value;
    storage.save_progress(&instance).await?;
    touch_course(storage, metric.course_id).await?;
    debug!(progress = %instance.id, target = %target, value = %new_value, "upserted progress");
    Ok(instance)
}

pub(crate) async fn upsert_achievement_rows<S: Storage>(
    storage: &mut S,
    progress_id: ProgressId,
    achievement_metric_id: AchievementMetricId,
    value: Decimal,
) -> Result<AchievementRecord> {
    let instance = require_progress(&*storage, progress_id).await?;
    let metric = require_achievement_metric(&*storage, achievement_metric_id).await?;
    if metric.course_metric_id != instance.course_metric_id {
        return Err(ProgressError::AggregateConsistency(
            "achievement metric must belong to the same course metric as the progress instance"
                .to_string(),
        ));
    }

    let course_metric = require_course_metric(&*storage, metric.course_metric_id).await?;
    let definition = require_definition(&*storage, course_metric.metric_id).await?;
    definition.kind.get(value)?;

    let records = storage.list_instance_achievements(progress_id).await?;
    let existing = records
        .iter()
        .find(|r| r.achievement_metric_id == achievement_metric_id)
        .cloned();

    // The instance's achievement values may never sum past its progress.
    let others: Decimal = records
        .iter()
        .filter(|r| r.achievement_metric_id != achievement_metric_id)
        .map(|r| r.value)
        .sum();
    if others + value > instance.value {
        return Err(ProgressError::AggregateConsistency(
            "achievement values exceed the progress instance value".to_string(),
        ));
    }

    let old = existing.as_ref().map(|r| r.value).unwrap_or(Decimal::ZERO);
    let delta = value - old;

    // Best-effort upper bound against the parent aggregate.
    if metric.total + delta > course_metric.total {
        return Err(ProgressError::AggregateConsistency(
            "achievement total would exceed the course metric total".to_string(),
        ));
    }

    if delta != Decimal::ZERO {
        apply_achievement_delta(storage, achievement_metric_id, delta).await?;
    }

    let mut record = existing
        .unwrap_or_else(|| AchievementRecord::new(progress_id, achievement_metric_id));
    if value > old {
        record.achieved_at = Some(chrono::Utc::now());
    }
    record.value = value;
    storage.save_achievement(&record).await?;
    touch_course(storage, course_metric.course_id).await?;
    debug!(achievement = %record.id, value = %value, "upserted achievement");
    Ok(record)
}

/// Remove a progress instance and its achievement records, decrementing
/// every parent aggregate. Deletion is set-to-zero followed by row removal.
pub(crate) async fn remove_progress_rows<S: Storage>(
    storage: &mut S,
    instance: &ProgressInstance,
) -> Result<()> {
    for record in storage.list_instance_achievements(instance.id).await? {
        apply_achievement_delta(storage, record.achievement_metric_id, -record.value).await?;
        storage.delete_achievement(record.id).await?;
    }
    apply_course_delta(storage, instance.course_metric_id, -instance.value).await?;
    storage.delete_progress(instance.id).await?;
    Ok(())
}

/// Remove every progress instance recorded against a target, across all of
/// the course's metrics.
pub(crate) async fn clear_target_progress<S: Storage>(
    storage: &mut S,
    course_id: CourseId,
    target: TrackableRef,
) -> Result<()> {
    for metric in storage.list_course_metrics(course_id).await? {
        if let Some(instance) = find_progress(&*storage, metric.id, target).await? {
            remove_progress_rows(storage, &instance).await?;
        }
    }
    Ok(())
}

async fn delete_course_rows<S: Storage>(storage: &mut S, course_id: CourseId) -> Result<()> {
    require_course(&*storage, course_id).await?;

    for metric in storage.list_course_metrics(course_id).await? {
        for level in storage.list_achievement_metrics(metric.id).await? {
            for record in storage.list_achievements(level.id).await? {
                storage.delete_achievement(record.id).await?;
            }
            storage.delete_achievement_metric(level.id).await?;
        }
        for instance in storage.list_progress(metric.id).await? {
            storage.delete_progress(instance.id).await?;
        }
        storage.delete_course_metric(metric.id).await?;
    }
    for definition in storage.list_metric_definitions(course_id).await? {
        storage.delete_metric_definition(definition.id).await?;
    }
    for chapter in storage.list_chapters(course_id).await? {
        storage.delete_chapter(chapter.id).await?;
    }
    storage.delete_course(course_id).await?;
    info!(course = %course_id, "deleted course and all owned records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use studytrack_storage::MemoryStorage;

    async fn engine_with_metric(
        kind: MetricKind,
    ) -> (ProgressEngine<MemoryStorage>, CourseId, CourseMetricId) {
        let engine = ProgressEngine::new(MemoryStorage::new());
        let course = engine
            .create_course(UserId::new("ada"), "Programming Languages")
            .await
            .unwrap();
        let definition = engine
            .create_metric_definition(course.id, "pages", kind)
            .await
            .unwrap();
        let metric = engine
            .register_course_metric(course.id, definition.id)
            .await
            .unwrap();
        (engine, course.id, metric.id)
    }

    #[tokio::test]
    async fn total_tracks_sum_of_final_values() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let t1 = TrackableRef::Course(course_id);
        let instance = engine
            .upsert_progress_value(t1, metric_id, Some(dec!(10)))
            .await
            .unwrap();

        let chapter = engine
            .insert_chapter(course_id, None, "Syntax", None)
            .await
            .unwrap();
        engine
            .upsert_progress_value(TrackableRef::Chapter(chapter.id), metric_id, Some(dec!(20)))
            .await
            .unwrap();
        assert_eq!(engine.course_metric_total(metric_id).await.unwrap(), dec!(30));

        // -5 delta on the first instance
        let updated = engine
            .upsert_progress_value(t1, metric_id, Some(dec!(5)))
            .await
            .unwrap();
        assert_eq!(updated.id, instance.id);
        assert_eq!(engine.course_metric_total(metric_id).await.unwrap(), dec!(25));
    }

    #[tokio::test]
    async fn absent_value_means_zero() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let target = TrackableRef::Course(course_id);
        engine
            .upsert_progress_value(target, metric_id, Some(dec!(10)))
            .await
            .unwrap();
        engine
            .upsert_progress_value(target, metric_id, None)
            .await
            .unwrap();
        assert_eq!(engine.course_metric_total(metric_id).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn kind_validation_guards_the_write() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Percentage).await;
        let target = TrackableRef::Course(course_id);
        engine
            .upsert_progress_value(target, metric_id, Some(dec!(60)))
            .await
            .unwrap();

        let chapter = engine
            .insert_chapter(course_id, None, "Intro", None)
            .await
            .unwrap();
        let err = engine
            .upsert_progress_value(
                TrackableRef::Chapter(chapter.id),
                metric_id,
                Some(dec!(150)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Metric(_)));

        // The failed upsert applied no partial delta.
        assert_eq!(engine.course_metric_total(metric_id).await.unwrap(), dec!(60));
    }

    #[tokio::test]
    async fn boolean_progress_accepts_only_zero_and_one() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Boolean).await;
        let target = TrackableRef::Course(course_id);
        engine
            .upsert_progress_value(target, metric_id, Some(dec!(1)))
            .await
            .unwrap();
        let err = engine
            .upsert_progress_value(target, metric_id, Some(dec!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Metric(_)));
    }

    #[tokio::test]
    async fn foreign_target_is_rejected() {
        let (engine, _course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let other = engine
            .create_course(UserId::new("ada"), "Other Course")
            .await
            .unwrap();
        let err = engine
            .upsert_progress_value(TrackableRef::Course(other.id), metric_id, Some(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));
    }

    #[tokio::test]
    async fn duplicate_definition_and_registration_conflict() {
        let (engine, course_id, _metric_id) = engine_with_metric(MetricKind::Number).await;
        let err = engine
            .create_metric_definition(course_id, "pages", MetricKind::Time)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Conflict(_)));

        let definition = engine
            .create_metric_definition(course_id, "minutes", MetricKind::Time)
            .await
            .unwrap();
        engine
            .register_course_metric(course_id, definition.id)
            .await
            .unwrap();
        let err = engine
            .register_course_metric(course_id, definition.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Conflict(_)));
    }

    #[tokio::test]
    async fn definition_is_scoped_to_its_course() {
        let (engine, course_id, _metric_id) = engine_with_metric(MetricKind::Number).await;
        let other = engine
            .create_course(UserId::new("ada"), "Other")
            .await
            .unwrap();
        let foreign = engine
            .create_metric_definition(other.id, "pages", MetricKind::Number)
            .await
            .unwrap();

        let err = engine
            .register_course_metric(course_id, foreign.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));
    }

    #[tokio::test]
    async fn achievement_cannot_exceed_progress() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let level = engine
            .add_achievement_metric(metric_id, "Done", 100, None)
            .await
            .unwrap();
        let instance = engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(10)))
            .await
            .unwrap();

        let err = engine
            .upsert_achievement_value(instance.id, level.id, Some(dec!(11)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));

        engine
            .upsert_achievement_value(instance.id, level.id, Some(dec!(10)))
            .await
            .unwrap();
        assert_eq!(
            engine.achievement_metric_total(level.id).await.unwrap(),
            dec!(10)
        );
    }

    #[tokio::test]
    async fn instance_achievements_share_the_progress_budget() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let done = engine
            .add_achievement_metric(metric_id, "Done", 60, None)
            .await
            .unwrap();
        let summarized = engine
            .add_achievement_metric(metric_id, "Summarized", 40, None)
            .await
            .unwrap();
        let instance = engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(10)))
            .await
            .unwrap();

        engine
            .upsert_achievement_value(instance.id, done.id, Some(dec!(7)))
            .await
            .unwrap();
        let err = engine
            .upsert_achievement_value(instance.id, summarized.id, Some(dec!(4)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));
        engine
            .upsert_achievement_value(instance.id, summarized.id, Some(dec!(3)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn achievement_metric_must_match_progress_metric() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let other_def = engine
            .create_metric_definition(course_id, "minutes", MetricKind::Number)
            .await
            .unwrap();
        let other_metric = engine
            .register_course_metric(course_id, other_def.id)
            .await
            .unwrap();
        let foreign_level = engine
            .add_achievement_metric(other_metric.id, "Done", 50, None)
            .await
            .unwrap();

        let instance = engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(10)))
            .await
            .unwrap();
        let err = engine
            .upsert_achievement_value(instance.id, foreign_level.id, Some(dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));
    }

    #[tokio::test]
    async fn weight_is_bounded() {
        let (engine, _course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let err = engine
            .add_achievement_metric(metric_id, "Done", 101, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));
    }

    #[tokio::test]
    async fn removing_progress_cascades() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let level = engine
            .add_achievement_metric(metric_id, "Done", 100, None)
            .await
            .unwrap();
        let instance = engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(10)))
            .await
            .unwrap();
        engine
            .upsert_achievement_value(instance.id, level.id, Some(dec!(4)))
            .await
            .unwrap();

        engine.remove_progress(instance.id).await.unwrap();
        assert_eq!(engine.course_metric_total(metric_id).await.unwrap(), dec!(0));
        assert_eq!(
            engine.achievement_metric_total(level.id).await.unwrap(),
            dec!(0)
        );
    }

    #[tokio::test]
    async fn recompute_repairs_a_corrupted_total() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(10)))
            .await
            .unwrap();

        // Corrupt the stored total behind the engine's back.
        let mut storage = engine.into_inner();
        let mut metric = storage.load_course_metric(metric_id).await.unwrap().unwrap();
        metric.total = dec!(999);
        storage.save_course_metric(&metric).await.unwrap();

        let engine = ProgressEngine::new(storage);
        assert_eq!(
            engine.course_metric_total(metric_id).await.unwrap(),
            dec!(999)
        );
        assert_eq!(
            engine
                .recompute_course_metric_total(metric_id)
                .await
                .unwrap(),
            dec!(10)
        );
        assert_eq!(engine.course_metric_total(metric_id).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn typed_total_converts_through_the_kind() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Time).await;
        engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(90)))
            .await
            .unwrap();
        assert_eq!(
            engine.typed_total(metric_id).await.unwrap(),
            MetricValue::Time(std::time::Duration::from_secs(90))
        );
    }

    #[tokio::test]
    async fn metric_mutation_touches_the_course() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        let before = {
            let storage = engine.storage.lock().await;
            storage.load_course(course_id).await.unwrap().unwrap().date_modified
        };
        engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(1)))
            .await
            .unwrap();
        let after = {
            let storage = engine.storage.lock().await;
            storage.load_course(course_id).await.unwrap().unwrap().date_modified
        };
        assert!(after >= before);
    }

    #[tokio::test]
    async fn deleting_a_course_removes_its_records() {
        let (engine, course_id, metric_id) = engine_with_metric(MetricKind::Number).await;
        engine
            .upsert_progress_value(TrackableRef::Course(course_id), metric_id, Some(dec!(3)))
            .await
            .unwrap();
        engine.delete_course(course_id).await.unwrap();

        let err = engine.course_metric_total(metric_id).await.unwrap_err();
        assert!(matches!(err, ProgressError::NotFound(_)));
    }
}
