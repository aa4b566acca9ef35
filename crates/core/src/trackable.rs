//! Polymorphic references to entities progress can be recorded against.

use serde::{Deserialize, Serialize};

use crate::id::{ChapterId, CourseId};

/// Reference to a trackable entity: a course itself, or one of its chapters.
///
/// Progress instances attach to these rather than to a concrete model, so a
/// single metric can aggregate over the course and all of its chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TrackableRef {
    /// The course as a whole
    Course(CourseId),
    /// A chapter (or subchapter) of the course
    Chapter(ChapterId),
}

impl std::fmt::Display for TrackableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackableRef::Course(id) => write!(f, "course:{}", id),
            TrackableRef::Chapter(id) => write!(f, "chapter:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tags_by_kind() {
        let target = TrackableRef::Course(CourseId::new());
        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains("\"kind\":\"course\""));
        let back: TrackableRef = serde_json::from_str(&json).unwrap();
        assert_eq!(target, back);
    }
}
