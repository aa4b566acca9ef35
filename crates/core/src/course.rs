//! Course and chapter models.

use serde::{Deserialize, Serialize};

use crate::id::{ChapterId, CourseId, UserId};
use crate::Time;

/// A course a learner is working through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier
    pub id: CourseId,

    /// Owning user
    pub owner: UserId,

    /// Course title
    pub title: String,

    /// Institution offering the course
    pub institution: Option<String>,

    /// Instructor name
    pub instructor: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// Study points / credits
    pub study_points: Option<u32>,

    /// Created at
    pub date_added: Time,

    /// Last structural or progress modification
    pub date_modified: Time,

    /// Completed at, if completed
    pub date_completed: Option<Time>,
}

impl Course {
    /// Create a new course owned by `owner`.
    pub fn new(owner: UserId, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: CourseId::new(),
            owner,
            title: title.into(),
            institution: None,
            instructor: None,
            description: None,
            study_points: None,
            date_added: now,
            date_modified: now,
            date_completed: None,
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.date_modified = chrono::Utc::now();
    }

    /// Mark the course completed. The completion timestamp is only
    /// stamped once; later calls keep the original.
    pub fn complete(&mut self) {
        if self.date_completed.is_none() {
            self.date_completed = Some(chrono::Utc::now());
        }
        self.touch();
    }

    /// Whether `user` may read or modify this course.
    pub fn has_access(&self, user: &UserId) -> bool {
        &self.owner == user
    }
}

/// A chapter within a course. Chapters nest via `parent`; siblings share
/// `(course_id, parent)` and carry a dense 1-based `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Unique identifier
    pub id: ChapterId,

    /// Owning course
    pub course_id: CourseId,

    /// Parent chapter, if this is a subchapter
    pub parent: Option<ChapterId>,

    /// 1-based position among siblings
    pub order: u32,

    /// Chapter title
    pub title: String,

    /// Whether the chapter shows up numbered in the outline
    pub is_numbered: bool,

    /// Chapter notes/content
    pub content: Option<String>,

    /// Created at
    pub date_added: Time,

    /// Last modified
    pub date_modified: Time,
}

impl Chapter {
    /// Create a chapter at a provisional order. The ordering subsystem
    /// assigns the real position on insert.
    pub fn new(course_id: CourseId, parent: Option<ChapterId>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: ChapterId::new(),
            course_id,
            parent,
            order: 1,
            title: title.into(),
            is_numbered: true,
            content: None,
            date_added: now,
            date_modified: now,
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.date_modified = chrono::Utc::now();
    }
}
