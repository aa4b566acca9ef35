//! Study sessions.
//!
//! A session is a bounded window of study time owned by one user. While a
//! session is open, achievement deltas can be applied through it; each
//! applied delta leaves an [`AchievementChange`] row behind, so the work done
//! in a session can be replayed or summed afterwards.

use rust_decimal::Decimal;
use studytrack_core::{
    AchievementChange, AchievementMetricId, ProgressId, SessionId, StudySession, Time, UserId,
};
use studytrack_storage::Storage;
use tracing::info;

use crate::engine::{
    finish, require_achievement_metric, require_course, require_course_metric, require_progress,
    upsert_achievement_rows, ProgressEngine,
};
use crate::error::{ProgressError, Result};

impl<S: Storage> ProgressEngine<S> {
    /// Open a study session for a user, starting now.
    pub async fn start_session(&self, user: UserId) -> Result<StudySession> {
        let mut storage = self.storage.lock().await;
        let session = StudySession::start(user);
        let out = storage
            .save_session(&session)
            .await
            .map_err(ProgressError::from)
            .map(|_| session);
        let session = finish(&mut *storage, "start session", out).await?;
        info!(session = %session.id, user = %session.user.0, "started study session");
        Ok(session)
    }

    /// Close a session, recording the end time and optionally the net study
    /// time. The window must be valid: the end must not precede the start,
    /// and `time_spent` must fit inside the window.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        end_time: Time,
        time_spent: Option<std::time::Duration>,
    ) -> Result<StudySession> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let mut session = require_session(&*storage, session_id).await?;
            session.end_time = Some(end_time);
            session.time_spent = time_spent;
            session.validate().map_err(ProgressError::Session)?;
            storage.save_session(&session).await?;
            Ok(session)
        }
        .await;
        finish(&mut *storage, "close session", out).await
    }

    /// Apply a signed achievement delta inside a session. The session must
    /// still be open and its holder must own the course the progress
    /// instance belongs to. The record's new value is `old + delta`, pushed
    /// through the same validation and aggregate propagation as a direct
    /// upsert, and the applied delta is journalled as an
    /// [`AchievementChange`].
    pub async fn apply_achievement_change(
        &self,
        session_id: SessionId,
        progress_id: ProgressId,
        achievement_metric_id: AchievementMetricId,
        delta: Decimal,
    ) -> Result<AchievementChange> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let session = require_session(&*storage, session_id).await?;
            if session.end_time.is_some() {
                return Err(ProgressError::Session(
                    "session is already closed".to_string(),
                ));
            }

            let instance = require_progress(&*storage, progress_id).await?;
            let course_metric =
                require_course_metric(&*storage, instance.course_metric_id).await?;
            let course = require_course(&*storage, course_metric.course_id).await?;
            if !course.has_access(&session.user) {
                return Err(ProgressError::Session(
                    "session holder does not own the course".to_string(),
                ));
            }

            let metric = require_achievement_metric(&*storage, achievement_metric_id).await?;
            let old = storage
                .list_instance_achievements(progress_id)
                .await?
                .into_iter()
                .find(|r| r.achievement_metric_id == metric.id)
                .map(|r| r.value)
                .unwrap_or(Decimal::ZERO);

            let record =
                upsert_achievement_rows(&mut *storage, progress_id, metric.id, old + delta)
                    .await?;

            let change = AchievementChange::new(session_id, record.id, delta);
            storage.save_change(&change).await?;
            info!(
                session = %session_id,
                achievement = %record.id,
                %delta,
                "recorded achievement change"
            );
            Ok(change)
        }
        .await;
        finish(&mut *storage, "apply achievement change", out).await
    }

    /// The changes journalled in a session, oldest first.
    pub async fn session_changes(&self, session_id: SessionId) -> Result<Vec<AchievementChange>> {
        let storage = self.storage.lock().await;
        require_session(&*storage, session_id).await?;
        let mut changes = storage.list_session_changes(session_id).await?;
        changes.sort_by_key(|c| c.recorded_at);
        Ok(changes)
    }
}

async fn require_session<S: Storage>(storage: &S, id: SessionId) -> Result<StudySession> {
    storage
        .load_session(id)
        .await?
        .ok_or_else(|| ProgressError::NotFound(format!("study session {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use studytrack_core::{CourseMetricId, MetricKind, TrackableRef};
    use studytrack_storage::MemoryStorage;

    struct Fixture {
        engine: ProgressEngine<MemoryStorage>,
        metric_id: CourseMetricId,
        level_id: AchievementMetricId,
        progress_id: ProgressId,
    }

    async fn fixture() -> Fixture {
        let engine = ProgressEngine::new(MemoryStorage::new());
        let course = engine
            .create_course(UserId::new("ada"), "Compilers")
            .await
            .unwrap();
        let definition = engine
            .create_metric_definition(course.id, "pages", MetricKind::Number)
            .await
            .unwrap();
        let metric = engine
            .register_course_metric(course.id, definition.id)
            .await
            .unwrap();
        let level = engine
            .add_achievement_metric(metric.id, "Done", 100, None)
            .await
            .unwrap();
        let instance = engine
            .upsert_progress_value(TrackableRef::Course(course.id), metric.id, Some(dec!(50)))
            .await
            .unwrap();
        Fixture {
            engine,
            metric_id: metric.id,
            level_id: level.id,
            progress_id: instance.id,
        }
    }

    #[tokio::test]
    async fn changes_accumulate_into_the_record() {
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("ada")).await.unwrap();

        f.engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(10))
            .await
            .unwrap();
        f.engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(5))
            .await
            .unwrap();

        assert_eq!(
            f.engine.achievement_metric_total(f.level_id).await.unwrap(),
            dec!(15)
        );
        let changes = f.engine.session_changes(session.id).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].value, dec!(10));
        assert_eq!(changes[1].value, dec!(5));
    }

    #[tokio::test]
    async fn negative_delta_backs_work_out() {
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("ada")).await.unwrap();
        f.engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(10))
            .await
            .unwrap();
        f.engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(-4))
            .await
            .unwrap();
        assert_eq!(
            f.engine.achievement_metric_total(f.level_id).await.unwrap(),
            dec!(6)
        );
    }

    #[tokio::test]
    async fn change_past_the_progress_budget_is_rejected() {
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("ada")).await.unwrap();
        let err = f
            .engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(51))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::AggregateConsistency(_)));
        assert!(f
            .engine
            .session_changes(session.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn foreign_holder_is_rejected() {
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("eve")).await.unwrap();
        let err = f
            .engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Session(_)));
        assert_eq!(
            f.engine.achievement_metric_total(f.level_id).await.unwrap(),
            dec!(0)
        );
    }

    #[tokio::test]
    async fn closed_session_takes_no_changes() {
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("ada")).await.unwrap();
        f.engine
            .close_session(session.id, chrono::Utc::now(), None)
            .await
            .unwrap();
        let err = f
            .engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Session(_)));
    }

    #[tokio::test]
    async fn close_validates_the_window() {
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("ada")).await.unwrap();

        let err = f
            .engine
            .close_session(
                session.id,
                session.start_time - chrono::Duration::minutes(1),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Session(_)));

        let end = session.start_time + chrono::Duration::minutes(30);
        let err = f
            .engine
            .close_session(session.id, end, Some(std::time::Duration::from_secs(3600)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Session(_)));

        let closed = f
            .engine
            .close_session(session.id, end, Some(std::time::Duration::from_secs(1200)))
            .await
            .unwrap();
        assert_eq!(closed.end_time, Some(end));
    }

    #[tokio::test]
    async fn course_and_metric_survive_session_traffic() {
        // A session writes through the same aggregate chain as direct
        // upserts, so the cached course total stays consistent.
        let f = fixture().await;
        let session = f.engine.start_session(UserId::new("ada")).await.unwrap();
        f.engine
            .apply_achievement_change(session.id, f.progress_id, f.level_id, dec!(20))
            .await
            .unwrap();
        assert_eq!(
            f.engine.course_metric_total(f.metric_id).await.unwrap(),
            dec!(50)
        );
        assert_eq!(
            f.engine
                .recompute_achievement_metric_total(f.level_id)
                .await
                .unwrap(),
            dec!(20)
        );
    }
}
