//! In-memory storage with snapshot-based commit/rollback.
//!
//! The live tables are cloned into a checkpoint on `commit`; `rollback`
//! restores the checkpoint. This gives real all-or-nothing semantics to the
//! engine's multi-row mutations without any I/O.

use std::collections::HashMap;

use studytrack_core::{
    AchievementChange, AchievementId, AchievementMetric, AchievementMetricId, AchievementRecord,
    ChangeId, Chapter, ChapterId, Course, CourseId, CourseMetric, CourseMetricId,
    MetricDefinition, MetricId, ProgressId, ProgressInstance, SessionId, StudySession,
};
use tracing::debug;

use super::{Result, Storage};

#[derive(Debug, Clone, Default)]
struct Tables {
    courses: HashMap<CourseId, Course>,
    chapters: HashMap<ChapterId, Chapter>,
    metric_definitions: HashMap<MetricId, MetricDefinition>,
    course_metrics: HashMap<CourseMetricId, CourseMetric>,
    achievement_metrics: HashMap<AchievementMetricId, AchievementMetric>,
    progress: HashMap<ProgressId, ProgressInstance>,
    achievements: HashMap<AchievementId, AchievementRecord>,
    sessions: HashMap<SessionId, StudySession>,
    changes: HashMap<ChangeId, AchievementChange>,
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    live: Tables,
    checkpoint: Tables,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn save_course(&mut self, course: &Course) -> Result<()> {
        self.live.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        Ok(self.live.courses.get(&id).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.live.courses.values().cloned().collect())
    }

    async fn delete_course(&mut self, id: CourseId) -> Result<()> {
        self.live.courses.remove(&id);
        Ok(())
    }

    async fn save_chapter(&mut self, chapter: &Chapter) -> Result<()> {
        self.live.chapters.insert(chapter.id, chapter.clone());
        Ok(())
    }

    async fn load_chapter(&self, id: ChapterId) -> Result<Option<Chapter>> {
        Ok(self.live.chapters.get(&id).cloned())
    }

    async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<Chapter>> {
        Ok(self
            .live
            .chapters
            .values()
            .filter(|c| c.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn delete_chapter(&mut self, id: ChapterId) -> Result<()> {
        self.live.chapters.remove(&id);
        Ok(())
    }

    async fn save_metric_definition(&mut self, definition: &MetricDefinition) -> Result<()> {
        self.live
            .metric_definitions
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn load_metric_definition(&self, id: MetricId) -> Result<Option<MetricDefinition>> {
        Ok(self.live.metric_definitions.get(&id).cloned())
    }

    async fn list_metric_definitions(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<MetricDefinition>> {
        Ok(self
            .live
            .metric_definitions
            .values()
            .filter(|d| d.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn delete_metric_definition(&mut self, id: MetricId) -> Result<()> {
        self.live.metric_definitions.remove(&id);
        Ok(())
    }

    async fn save_course_metric(&mut self, metric: &CourseMetric) -> Result<()> {
        self.live.course_metrics.insert(metric.id, metric.clone());
        Ok(())
    }

    async fn load_course_metric(&self, id: CourseMetricId) -> Result<Option<CourseMetric>> {
        Ok(self.live.course_metrics.get(&id).cloned())
    }

    async fn list_course_metrics(&self, course_id: CourseId) -> Result<Vec<CourseMetric>> {
        Ok(self
            .live
            .course_metrics
            .values()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn delete_course_metric(&mut self, id: CourseMetricId) -> Result<()> {
        self.live.course_metrics.remove(&id);
        Ok(())
    }

    async fn save_achievement_metric(&mut self, metric: &AchievementMetric) -> Result<()> {
        self.live
            .achievement_metrics
            .insert(metric.id, metric.clone());
        Ok(())
    }

    async fn load_achievement_metric(
        &self,
        id: AchievementMetricId,
    ) -> Result<Option<AchievementMetric>> {
        Ok(self.live.achievement_metrics.get(&id).cloned())
    }

    async fn list_achievement_metrics(
        &self,
        course_metric_id: CourseMetricId,
    ) -> Result<Vec<AchievementMetric>> {
        Ok(self
            .live
            .achievement_metrics
            .values()
            .filter(|m| m.course_metric_id == course_metric_id)
            .cloned()
            .collect())
    }

    async fn delete_achievement_metric(&mut self, id: AchievementMetricId) -> Result<()> {
        self.live.achievement_metrics.remove(&id);
        Ok(())
    }

    async fn save_progress(&mut self, instance: &ProgressInstance) -> Result<()> {
        self.live.progress.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn load_progress(&self, id: ProgressId) -> Result<Option<ProgressInstance>> {
        Ok(self.live.progress.get(&id).cloned())
    }

    async fn list_progress(
        &self,
        course_metric_id: CourseMetricId,
    ) -> Result<Vec<ProgressInstance>> {
        Ok(self
            .live
            .progress
            .values()
            .filter(|p| p.course_metric_id == course_metric_id)
            .cloned()
            .collect())
    }

    async fn delete_progress(&mut self, id: ProgressId) -> Result<()> {
        self.live.progress.remove(&id);
        Ok(())
    }

    async fn save_achievement(&mut self, record: &AchievementRecord) -> Result<()> {
        self.live.achievements.insert(record.id, record.clone());
        Ok(())
    }

    async fn load_achievement(&self, id: AchievementId) -> Result<Option<AchievementRecord>> {
        Ok(self.live.achievements.get(&id).cloned())
    }

    async fn list_achievements(
        &self,
        achievement_metric_id: AchievementMetricId,
    ) -> Result<Vec<AchievementRecord>> {
        Ok(self
            .live
            .achievements
            .values()
            .filter(|a| a.achievement_metric_id == achievement_metric_id)
            .cloned()
            .collect())
    }

    async fn list_instance_achievements(
        &self,
        progress_id: ProgressId,
    ) -> Result<Vec<AchievementRecord>> {
        Ok(self
            .live
            .achievements
            .values()
            .filter(|a| a.progress_id == progress_id)
            .cloned()
            .collect())
    }

    async fn delete_achievement(&mut self, id: AchievementId) -> Result<()> {
        self.live.achievements.remove(&id);
        Ok(())
    }

    async fn save_session(&mut self, session: &StudySession) -> Result<()> {
        self.live.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> Result<Option<StudySession>> {
        Ok(self.live.sessions.get(&id).cloned())
    }

    async fn save_change(&mut self, change: &AchievementChange) -> Result<()> {
        self.live.changes.insert(change.id, change.clone());
        Ok(())
    }

    async fn list_session_changes(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<AchievementChange>> {
        Ok(self
            .live
            .changes
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        debug!(message, "committing in-memory checkpoint");
        self.checkpoint = self.live.clone();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        debug!("rolling back to last checkpoint");
        self.live = self.checkpoint.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studytrack_core::UserId;

    #[tokio::test]
    async fn rollback_restores_last_commit() {
        let mut storage = MemoryStorage::new();

        let committed = Course::new(UserId::new("ada"), "Kept");
        storage.save_course(&committed).await.unwrap();
        storage.commit("keep").await.unwrap();

        let discarded = Course::new(UserId::new("ada"), "Dropped");
        storage.save_course(&discarded).await.unwrap();
        storage.rollback().await.unwrap();

        assert!(storage.load_course(committed.id).await.unwrap().is_some());
        assert!(storage.load_course(discarded.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chapter_listing_scopes_to_course() {
        let mut storage = MemoryStorage::new();
        let a = Course::new(UserId::new("ada"), "A");
        let b = Course::new(UserId::new("ada"), "B");
        storage
            .save_chapter(&Chapter::new(a.id, None, "Intro"))
            .await
            .unwrap();

        assert_eq!(storage.list_chapters(a.id).await.unwrap().len(), 1);
        assert!(storage.list_chapters(b.id).await.unwrap().is_empty());
    }
}
