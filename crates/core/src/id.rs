//! Unique identifiers for StudyTrack entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new identifier
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_id! {
    /// Unique identifier for a Course
    CourseId
}

define_id! {
    /// Unique identifier for a Chapter
    ChapterId
}

define_id! {
    /// Unique identifier for a MetricDefinition
    MetricId
}

define_id! {
    /// Unique identifier for a CourseMetric aggregate
    CourseMetricId
}

define_id! {
    /// Unique identifier for an AchievementMetric aggregate
    AchievementMetricId
}

define_id! {
    /// Unique identifier for a ProgressInstance
    ProgressId
}

define_id! {
    /// Unique identifier for an AchievementRecord
    AchievementId
}

define_id! {
    /// Unique identifier for a StudySession
    SessionId
}

define_id! {
    /// Unique identifier for an AchievementChange
    ChangeId
}

/// Identifier for a user (course owner or study session holder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_string() {
        let id = CourseId::new();
        let parsed: CourseId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_ids_differ() {
        assert_ne!(ChapterId::new(), ChapterId::new());
    }
}
