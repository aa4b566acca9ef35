//! Chapter ordering.
//!
//! Siblings are the chapters sharing `(course_id, parent)`. Their orders are
//! always a dense permutation of `1..=N`: insert shifts the tail up, delete
//! closes the gap, move shifts the range between the two positions. All
//! shifts of one operation happen under a single lock hold and commit, so
//! readers never observe a transiently inconsistent ordering.

use studytrack_core::{Chapter, ChapterId, CourseId, TrackableRef};
use studytrack_storage::Storage;
use tracing::debug;

use crate::engine::{
    clear_target_progress, finish, require_course, touch_course, ProgressEngine,
};
use crate::error::{ProgressError, Result};

impl<S: Storage> ProgressEngine<S> {
    /// Insert a chapter. Without a position it goes last (`max + 1`, or 1
    /// for the first sibling); with a position `P ∈ [1, N+1]`, every sibling
    /// at `P` or later shifts up by one first.
    pub async fn insert_chapter(
        &self,
        course_id: CourseId,
        parent: Option<ChapterId>,
        title: impl Into<String>,
        position: Option<u32>,
    ) -> Result<Chapter> {
        let mut storage = self.storage.lock().await;
        let title = title.into();
        let out = async {
            require_course(&*storage, course_id).await?;
            if let Some(parent_id) = parent {
                let parent_chapter = storage
                    .load_chapter(parent_id)
                    .await?
                    .ok_or_else(|| ProgressError::NotFound(format!("chapter {parent_id}")))?;
                if parent_chapter.course_id != course_id {
                    return Err(ProgressError::AggregateConsistency(
                        "parent chapter belongs to another course".to_string(),
                    ));
                }
            }

            let siblings = siblings(&*storage, course_id, parent).await?;
            let count = siblings.len() as u32;
            let order = match position {
                None => count + 1,
                Some(p) => {
                    if p < 1 || p > count + 1 {
                        return Err(ProgressError::Ordering(format!(
                            "insert position {p} outside [1, {}]",
                            count + 1
                        )));
                    }
                    for mut sibling in siblings {
                        if sibling.order >= p {
                            sibling.order += 1;
                            storage.save_chapter(&sibling).await?;
                        }
                    }
                    p
                }
            };

            let mut chapter = Chapter::new(course_id, parent, title);
            chapter.order = order;
            storage.save_chapter(&chapter).await?;
            touch_course(&mut *storage, course_id).await?;
            debug!(chapter = %chapter.id, order, "inserted chapter");
            Ok(chapter)
        }
        .await;
        finish(&mut *storage, "insert chapter", out).await
    }

    /// Move a chapter to `new_position ∈ [1, N]` among its siblings. Moving
    /// down shifts the passed-over range down; moving up shifts it up. A
    /// move to the current position is a no-op.
    pub async fn move_chapter(&self, chapter_id: ChapterId, new_position: u32) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let mut chapter = storage
                .load_chapter(chapter_id)
                .await?
                .ok_or_else(|| ProgressError::NotFound(format!("chapter {chapter_id}")))?;
            let siblings = siblings(&*storage, chapter.course_id, chapter.parent).await?;
            let count = siblings.len() as u32;
            if new_position < 1 || new_position > count {
                return Err(ProgressError::Ordering(format!(
                    "move position {new_position} outside [1, {count}]"
                )));
            }

            let current = chapter.order;
            if new_position == current {
                return Ok(());
            }

            for mut sibling in siblings {
                if sibling.id == chapter.id {
                    continue;
                }
                if new_position < current
                    && sibling.order >= new_position
                    && sibling.order < current
                {
                    sibling.order += 1;
                    storage.save_chapter(&sibling).await?;
                } else if new_position > current
                    && sibling.order > current
                    && sibling.order <= new_position
                {
                    sibling.order -= 1;
                    storage.save_chapter(&sibling).await?;
                }
            }

            chapter.order = new_position;
            chapter.touch();
            storage.save_chapter(&chapter).await?;
            touch_course(&mut *storage, chapter.course_id).await?;
            debug!(chapter = %chapter.id, from = current, to = new_position, "moved chapter");
            Ok(())
        }
        .await;
        finish(&mut *storage, "move chapter", out).await
    }

    /// Delete a chapter and its subtree. Every progress instance recorded
    /// against a deleted chapter is cleared through the delta routine first,
    /// then remaining siblings close the gap.
    pub async fn delete_chapter(&self, chapter_id: ChapterId) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let out = async {
            let chapter = storage
                .load_chapter(chapter_id)
                .await?
                .ok_or_else(|| ProgressError::NotFound(format!("chapter {chapter_id}")))?;

            // Subtree, root included.
            let all = storage.list_chapters(chapter.course_id).await?;
            let mut doomed = vec![chapter.clone()];
            let mut frontier = vec![chapter.id];
            while let Some(parent_id) = frontier.pop() {
                for child in all.iter().filter(|c| c.parent == Some(parent_id)) {
                    doomed.push(child.clone());
                    frontier.push(child.id);
                }
            }

            for victim in &doomed {
                clear_target_progress(
                    &mut *storage,
                    victim.course_id,
                    TrackableRef::Chapter(victim.id),
                )
                .await?;
                storage.delete_chapter(victim.id).await?;
            }

            // Close the gap among the remaining siblings.
            let remaining = siblings(&*storage, chapter.course_id, chapter.parent).await?;
            for mut sibling in remaining {
                if sibling.order > chapter.order {
                    sibling.order -= 1;
                    storage.save_chapter(&sibling).await?;
                }
            }

            touch_course(&mut *storage, chapter.course_id).await?;
            debug!(chapter = %chapter.id, removed = doomed.len(), "deleted chapter subtree");
            Ok(())
        }
        .await;
        finish(&mut *storage, "delete chapter", out).await
    }

    /// The chapters sharing `(course_id, parent)`, sorted by order.
    pub async fn list_siblings(
        &self,
        course_id: CourseId,
        parent: Option<ChapterId>,
    ) -> Result<Vec<Chapter>> {
        let storage = self.storage.lock().await;
        siblings(&*storage, course_id, parent).await
    }
}

async fn siblings<S: Storage>(
    storage: &S,
    course_id: CourseId,
    parent: Option<ChapterId>,
) -> Result<Vec<Chapter>> {
    let mut chapters: Vec<Chapter> = storage
        .list_chapters(course_id)
        .await?
        .into_iter()
        .filter(|c| c.parent == parent)
        .collect();
    chapters.sort_by_key(|c| c.order);
    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use studytrack_core::{MetricKind, UserId};
    use studytrack_storage::MemoryStorage;

    async fn engine_with_course() -> (ProgressEngine<MemoryStorage>, CourseId) {
        let engine = ProgressEngine::new(MemoryStorage::new());
        let course = engine
            .create_course(UserId::new("ada"), "Algorithms")
            .await
            .unwrap();
        (engine, course.id)
    }

    async fn orders(
        engine: &ProgressEngine<MemoryStorage>,
        course_id: CourseId,
    ) -> Vec<(String, u32)> {
        engine
            .list_siblings(course_id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.title, c.order))
            .collect()
    }

    #[tokio::test]
    async fn appends_get_sequential_orders() {
        let (engine, course_id) = engine_with_course().await;
        for title in ["C1", "C2", "C3", "C4"] {
            engine
                .insert_chapter(course_id, None, title, None)
                .await
                .unwrap();
        }
        assert_eq!(
            orders(&engine, course_id).await,
            vec![
                ("C1".to_string(), 1),
                ("C2".to_string(), 2),
                ("C3".to_string(), 3),
                ("C4".to_string(), 4),
            ]
        );
    }

    #[tokio::test]
    async fn delete_closes_the_gap() {
        let (engine, course_id) = engine_with_course().await;
        let mut ids = Vec::new();
        for title in ["C1", "C2", "C3", "C4"] {
            ids.push(
                engine
                    .insert_chapter(course_id, None, title, None)
                    .await
                    .unwrap()
                    .id,
            );
        }
        engine.delete_chapter(ids[1]).await.unwrap();
        assert_eq!(
            orders(&engine, course_id).await,
            vec![
                ("C1".to_string(), 1),
                ("C3".to_string(), 2),
                ("C4".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn move_to_front_shifts_the_passed_range() {
        let (engine, course_id) = engine_with_course().await;
        let mut ids = Vec::new();
        for title in ["C1", "C2", "C3", "C4"] {
            ids.push(
                engine
                    .insert_chapter(course_id, None, title, None)
                    .await
                    .unwrap()
                    .id,
            );
        }
        // Moving position 3 to 1 yields C3=1, C1=2, C2=3, C4=4.
        engine.move_chapter(ids[2], 1).await.unwrap();
        assert_eq!(
            orders(&engine, course_id).await,
            vec![
                ("C3".to_string(), 1),
                ("C1".to_string(), 2),
                ("C2".to_string(), 3),
                ("C4".to_string(), 4),
            ]
        );
    }

    #[tokio::test]
    async fn move_down_shifts_the_passed_range() {
        let (engine, course_id) = engine_with_course().await;
        let mut ids = Vec::new();
        for title in ["C1", "C2", "C3"] {
            ids.push(
                engine
                    .insert_chapter(course_id, None, title, None)
                    .await
                    .unwrap()
                    .id,
            );
        }
        engine.move_chapter(ids[0], 3).await.unwrap();
        assert_eq!(
            orders(&engine, course_id).await,
            vec![
                ("C2".to_string(), 1),
                ("C3".to_string(), 2),
                ("C1".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn insert_at_position_shifts_the_tail() {
        let (engine, course_id) = engine_with_course().await;
        for title in ["C1", "C2", "C3"] {
            engine
                .insert_chapter(course_id, None, title, None)
                .await
                .unwrap();
        }
        engine
            .insert_chapter(course_id, None, "C1.5", Some(2))
            .await
            .unwrap();
        assert_eq!(
            orders(&engine, course_id).await,
            vec![
                ("C1".to_string(), 1),
                ("C1.5".to_string(), 2),
                ("C2".to_string(), 3),
                ("C3".to_string(), 4),
            ]
        );
    }

    #[tokio::test]
    async fn positions_outside_the_dense_range_are_rejected() {
        let (engine, course_id) = engine_with_course().await;
        let chapter = engine
            .insert_chapter(course_id, None, "C1", None)
            .await
            .unwrap();

        let err = engine
            .insert_chapter(course_id, None, "C2", Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Ordering(_)));
        let err = engine
            .insert_chapter(course_id, None, "C2", Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Ordering(_)));
        let err = engine.move_chapter(chapter.id, 2).await.unwrap_err();
        assert!(matches!(err, ProgressError::Ordering(_)));
    }

    #[tokio::test]
    async fn nested_siblings_order_independently() {
        let (engine, course_id) = engine_with_course().await;
        let top = engine
            .insert_chapter(course_id, None, "Top", None)
            .await
            .unwrap();
        let sub1 = engine
            .insert_chapter(course_id, Some(top.id), "Sub1", None)
            .await
            .unwrap();
        let sub2 = engine
            .insert_chapter(course_id, Some(top.id), "Sub2", None)
            .await
            .unwrap();

        assert_eq!(sub1.order, 1);
        assert_eq!(sub2.order, 2);
        // Top-level ordering is untouched by subchapter inserts.
        assert_eq!(orders(&engine, course_id).await, vec![("Top".to_string(), 1)]);
    }

    #[tokio::test]
    async fn delete_clears_subtree_progress_through_the_delta_routine() {
        let (engine, course_id) = engine_with_course().await;
        let definition = engine
            .create_metric_definition(course_id, "pages", MetricKind::Number)
            .await
            .unwrap();
        let metric = engine
            .register_course_metric(course_id, definition.id)
            .await
            .unwrap();

        let top = engine
            .insert_chapter(course_id, None, "Top", None)
            .await
            .unwrap();
        let sub = engine
            .insert_chapter(course_id, Some(top.id), "Sub", None)
            .await
            .unwrap();
        engine
            .upsert_progress_value(TrackableRef::Chapter(top.id), metric.id, Some(dec!(5)))
            .await
            .unwrap();
        engine
            .upsert_progress_value(TrackableRef::Chapter(sub.id), metric.id, Some(dec!(7)))
            .await
            .unwrap();
        assert_eq!(engine.course_metric_total(metric.id).await.unwrap(), dec!(12));

        engine.delete_chapter(top.id).await.unwrap();
        assert_eq!(engine.course_metric_total(metric.id).await.unwrap(), dec!(0));
        assert!(engine.list_siblings(course_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn structural_changes_touch_the_course() {
        let (engine, course_id) = engine_with_course().await;
        let before = {
            let storage = engine.storage.lock().await;
            storage.load_course(course_id).await.unwrap().unwrap().date_modified
        };
        engine
            .insert_chapter(course_id, None, "C1", None)
            .await
            .unwrap();
        let after = {
            let storage = engine.storage.lock().await;
            storage.load_course(course_id).await.unwrap().unwrap().date_modified
        };
        assert!(after >= before);
    }
}
