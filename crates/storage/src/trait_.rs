//! Storage trait abstraction.

use async_trait::async_trait;
use studytrack_core::{
    AchievementChange, AchievementId, AchievementMetric, AchievementMetricId, AchievementRecord,
    Chapter, ChapterId, Course, CourseId, CourseMetric, CourseMetricId, MetricDefinition,
    MetricId, ProgressId, ProgressInstance, SessionId, StudySession,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for StudyTrack data.
///
/// This trait allows different storage backends to be plugged in. Cascading
/// deletes are the engine's job; backends only remove the rows they are
/// asked to remove.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Course operations ===

    /// Save a course (create or update).
    async fn save_course(&mut self, course: &Course) -> Result<()>;

    /// Load a course by ID.
    async fn load_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// List all courses.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Delete a course row.
    async fn delete_course(&mut self, id: CourseId) -> Result<()>;

    // === Chapter operations ===

    /// Save a chapter.
    async fn save_chapter(&mut self, chapter: &Chapter) -> Result<()>;

    /// Load a chapter by ID.
    async fn load_chapter(&self, id: ChapterId) -> Result<Option<Chapter>>;

    /// List all chapters of a course (any nesting level).
    async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<Chapter>>;

    /// Delete a chapter row.
    async fn delete_chapter(&mut self, id: ChapterId) -> Result<()>;

    // === Metric definition operations ===

    /// Save a metric definition.
    async fn save_metric_definition(&mut self, definition: &MetricDefinition) -> Result<()>;

    /// Load a metric definition by ID.
    async fn load_metric_definition(&self, id: MetricId) -> Result<Option<MetricDefinition>>;

    /// List the metric definitions of a course.
    async fn list_metric_definitions(&self, course_id: CourseId) -> Result<Vec<MetricDefinition>>;

    /// Delete a metric definition row.
    async fn delete_metric_definition(&mut self, id: MetricId) -> Result<()>;

    // === Course metric aggregate operations ===

    /// Save a course metric aggregate.
    async fn save_course_metric(&mut self, metric: &CourseMetric) -> Result<()>;

    /// Load a course metric aggregate by ID.
    async fn load_course_metric(&self, id: CourseMetricId) -> Result<Option<CourseMetric>>;

    /// List the course metric aggregates of a course.
    async fn list_course_metrics(&self, course_id: CourseId) -> Result<Vec<CourseMetric>>;

    /// Delete a course metric aggregate row.
    async fn delete_course_metric(&mut self, id: CourseMetricId) -> Result<()>;

    // === Achievement metric aggregate operations ===

    /// Save an achievement metric aggregate.
    async fn save_achievement_metric(&mut self, metric: &AchievementMetric) -> Result<()>;

    /// Load an achievement metric aggregate by ID.
    async fn load_achievement_metric(
        &self,
        id: AchievementMetricId,
    ) -> Result<Option<AchievementMetric>>;

    /// List the achievement aggregates under a course metric.
    async fn list_achievement_metrics(
        &self,
        course_metric_id: CourseMetricId,
    ) -> Result<Vec<AchievementMetric>>;

    /// Delete an achievement metric aggregate row.
    async fn delete_achievement_metric(&mut self, id: AchievementMetricId) -> Result<()>;

    // === Progress instance operations ===

    /// Save a progress instance.
    async fn save_progress(&mut self, instance: &ProgressInstance) -> Result<()>;

    /// Load a progress instance by ID.
    async fn load_progress(&self, id: ProgressId) -> Result<Option<ProgressInstance>>;

    /// List the progress instances under a course metric.
    async fn list_progress(&self, course_metric_id: CourseMetricId)
        -> Result<Vec<ProgressInstance>>;

    /// Delete a progress instance row.
    async fn delete_progress(&mut self, id: ProgressId) -> Result<()>;

    // === Achievement record operations ===

    /// Save an achievement record.
    async fn save_achievement(&mut self, record: &AchievementRecord) -> Result<()>;

    /// Load an achievement record by ID.
    async fn load_achievement(&self, id: AchievementId) -> Result<Option<AchievementRecord>>;

    /// List the achievement records under an achievement metric.
    async fn list_achievements(
        &self,
        achievement_metric_id: AchievementMetricId,
    ) -> Result<Vec<AchievementRecord>>;

    /// List the achievement records belonging to a progress instance.
    async fn list_instance_achievements(
        &self,
        progress_id: ProgressId,
    ) -> Result<Vec<AchievementRecord>>;

    /// Delete an achievement record row.
    async fn delete_achievement(&mut self, id: AchievementId) -> Result<()>;

    // === Study session operations ===

    /// Save a study session.
    async fn save_session(&mut self, session: &StudySession) -> Result<()>;

    /// Load a study session by ID.
    async fn load_session(&self, id: SessionId) -> Result<Option<StudySession>>;

    /// Save an achievement change.
    async fn save_change(&mut self, change: &AchievementChange) -> Result<()>;

    /// List the changes recorded in a session.
    async fn list_session_changes(&self, session_id: SessionId)
        -> Result<Vec<AchievementChange>>;

    // === Transaction support ===

    /// Commit pending changes with a message.
    async fn commit(&mut self, message: &str) -> Result<()>;

    /// Rollback pending changes.
    async fn rollback(&mut self) -> Result<()>;
}
