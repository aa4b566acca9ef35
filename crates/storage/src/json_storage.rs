//! JSON file storage implementation.
//!
//! Stores data as JSON files in a data directory and keeps small per-object
//! meta markers (version + updated_at). Commit/rollback only track a pending
//! flag; real all-or-nothing semantics for engine tests come from
//! [`crate::MemoryStorage`].

use std::path::Path;
use std::sync::Arc;

use studytrack_core::{
    AchievementChange, AchievementId, AchievementMetric, AchievementMetricId, AchievementRecord,
    Chapter, ChapterId, Course, CourseId, CourseMetric, CourseMetricId, MetricDefinition,
    MetricId, ProgressId, ProgressInstance, SessionId, StudySession,
};
use tokio::fs;
use tokio::sync::Mutex;

use super::{Result, Storage};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: std::path::PathBuf,
    pending: Arc<Mutex<bool>>,
}

const KINDS: &[&str] = &[
    "courses",
    "chapters",
    "metric_definitions",
    "course_metrics",
    "achievement_metrics",
    "progress",
    "achievements",
    "sessions",
    "changes",
];

impl JsonStorage {
    /// Create storage, ensuring the per-entity subdirectories exist.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for kind in KINDS {
            fs::create_dir_all(root.join(kind)).await?;
            fs::create_dir_all(root.join("meta").join(kind)).await?;
        }

        Ok(Self {
            root,
            pending: Arc::new(Mutex::new(false)),
        })
    }

    fn path(&self, kind: &str, id: impl std::fmt::Display) -> std::path::PathBuf {
        self.root.join(kind).join(format!("{}.json", id))
    }

    fn meta_path(&self, kind: &str, id: &str) -> std::path::PathBuf {
        self.root.join("meta").join(kind).join(format!("{}.meta.json", id))
    }

    async fn set_pending(&self) {
        *self.pending.lock().await = true;
    }

    /// Read and increment per-object version, return new version.
    async fn bump_version(&self, kind: &str, id: &str) -> Result<u64> {
        let path = self.meta_path(kind, id);
        let mut version = 0u64;
        match fs::read_to_string(&path).await {
            Ok(s) => {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                    if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                        version = v;
                    }
                }
            }
            Err(_) => {
                // ignore missing
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn save<T: serde::Serialize>(
        &mut self,
        kind: &str,
        id: impl std::fmt::Display,
        item: &T,
    ) -> Result<()> {
        let id = id.to_string();
        let json = serde_json::to_string_pretty(item)?;
        fs::write(self.path(kind, &id), json.as_bytes()).await?;
        let _ver = self.bump_version(kind, &id).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn delete(&mut self, kind: &str, id: impl std::fmt::Display) -> Result<()> {
        fs::remove_file(self.path(kind, id)).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
        self.set_pending().await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_course(&mut self, course: &Course) -> Result<()> {
        self.save("courses", course.id, course).await
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        read_json(&self.path("courses", id)).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        list_dir(&self.root.join("courses")).await
    }

    async fn delete_course(&mut self, id: CourseId) -> Result<()> {
        self.delete("courses", id).await
    }

    async fn save_chapter(&mut self, chapter: &Chapter) -> Result<()> {
        self.save("chapters", chapter.id, chapter).await
    }

    async fn load_chapter(&self, id: ChapterId) -> Result<Option<Chapter>> {
        read_json(&self.path("chapters", id)).await
    }

    async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<Chapter>> {
        let all = list_dir(&self.root.join("chapters")).await?;
        Ok(all
            .into_iter()
            .filter(|c: &Chapter| c.course_id == course_id)
            .collect())
    }

    async fn delete_chapter(&mut self, id: ChapterId) -> Result<()> {
        self.delete("chapters", id).await
    }

    async fn save_metric_definition(&mut self, definition: &MetricDefinition) -> Result<()> {
        self.save("metric_definitions", definition.id, definition)
            .await
    }

    async fn load_metric_definition(&self, id: MetricId) -> Result<Option<MetricDefinition>> {
        read_json(&self.path("metric_definitions", id)).await
    }

    async fn list_metric_definitions(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<MetricDefinition>> {
        let all = list_dir(&self.root.join("metric_definitions")).await?;
        Ok(all
            .into_iter()
            .filter(|d: &MetricDefinition| d.course_id == course_id)
            .collect())
    }

    async fn delete_metric_definition(&mut self, id: MetricId) -> Result<()> {
        self.delete("metric_definitions", id).await
    }

    async fn save_course_metric(&mut self, metric: &CourseMetric) -> Result<()> {
        self.save("course_metrics", metric.id, metric).await
    }

    async fn load_course_metric(&self, id: CourseMetricId) -> Result<Option<CourseMetric>> {
        read_json(&self.path("course_metrics", id)).await
    }

    async fn list_course_metrics(&self, course_id: CourseId) -> Result<Vec<CourseMetric>> {
        let all = list_dir(&self.root.join("course_metrics")).await?;
        Ok(all
            .into_iter()
            .filter(|m: &CourseMetric| m.course_id == course_id)
            .collect())
    }

    async fn delete_course_metric(&mut self, id: CourseMetricId) -> Result<()> {
        self.delete("course_metrics", id).await
    }

    async fn save_achievement_metric(&mut self, metric: &AchievementMetric) -> Result<()> {
        self.save("achievement_metrics", metric.id, metric).await
    }

    async fn load_achievement_metric(
        &self,
        id: AchievementMetricId,
    ) -> Result<Option<AchievementMetric>> {
        read_json(&self.path("achievement_metrics", id)).await
    }

    async fn list_achievement_metrics(
        &self,
        course_metric_id: CourseMetricId,
    ) -> Result<Vec<AchievementMetric>> {
        let all = list_dir(&self.root.join("achievement_metrics")).await?;
        Ok(all
            .into_iter()
            .filter(|m: &AchievementMetric| m.course_metric_id == course_metric_id)
            .collect())
    }

    async fn delete_achievement_metric(&mut self, id: AchievementMetricId) -> Result<()> {
        self.delete("achievement_metrics", id).await
    }

    async fn save_progress(&mut self, instance: &ProgressInstance) -> Result<()> {
        self.save("progress", instance.id, instance).await
    }

    async fn load_progress(&self, id: ProgressId) -> Result<Option<ProgressInstance>> {
        read_json(&self.path("progress", id)).await
    }

    async fn list_progress(
        &self,
        course_metric_id: CourseMetricId,
    ) -> Result<Vec<ProgressInstance>> {
        let all = list_dir(&self.root.join("progress")).await?;
        Ok(all
            .into_iter()
            .filter(|p: &ProgressInstance| p.course_metric_id == course_metric_id)
            .collect())
    }

    async fn delete_progress(&mut self, id: ProgressId) -> Result<()> {
        self.delete("progress", id).await
    }

    async fn save_achievement(&mut self, record: &AchievementRecord) -> Result<()> {
        self.save("achievements", record.id, record).await
    }

    async fn load_achievement(&self, id: AchievementId) -> Result<Option<AchievementRecord>> {
        read_json(&self.path("achievements", id)).await
    }

    async fn list_achievements(
        &self,
        achievement_metric_id: AchievementMetricId,
    ) -> Result<Vec<AchievementRecord>> {
        let all = list_dir(&self.root.join("achievements")).await?;
        Ok(all
            .into_iter()
            .filter(|a: &AchievementRecord| a.achievement_metric_id == achievement_metric_id)
            .collect())
    }

    async fn list_instance_achievements(
        &self,
        progress_id: ProgressId,
    ) -> Result<Vec<AchievementRecord>> {
        let all = list_dir(&self.root.join("achievements")).await?;
        Ok(all
            .into_iter()
            .filter(|a: &AchievementRecord| a.progress_id == progress_id)
            .collect())
    }

    async fn delete_achievement(&mut self, id: AchievementId) -> Result<()> {
        self.delete("achievements", id).await
    }

    async fn save_session(&mut self, session: &StudySession) -> Result<()> {
        self.save("sessions", session.id, session).await
    }

    async fn load_session(&self, id: SessionId) -> Result<Option<StudySession>> {
        read_json(&self.path("sessions", id)).await
    }

    async fn save_change(&mut self, change: &AchievementChange) -> Result<()> {
        self.save("changes", change.id, change).await
    }

    async fn list_session_changes(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<AchievementChange>> {
        let all = list_dir(&self.root.join("changes")).await?;
        Ok(all
            .into_iter()
            .filter(|c: &AchievementChange| c.session_id == session_id)
            .collect())
    }

    async fn commit(&mut self, _message: &str) -> Result<()> {
        // No snapshotting by default; commit clears the pending flag.
        *self.pending.lock().await = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        // Advisory only: clears the pending flag.
        *self.pending.lock().await = false;
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &std::path::Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}
