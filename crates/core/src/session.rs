//! Study sessions and the achievement changes recorded during them.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{AchievementId, ChangeId, SessionId, UserId};
use crate::Time;

/// A bounded window of study time owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    /// Unique identifier
    pub id: SessionId,

    /// Session holder; must match the course owner for any change applied
    pub user: UserId,

    /// When the session started
    pub start_time: Time,

    /// When the session ended, if closed
    pub end_time: Option<Time>,

    /// Net study time inside the window
    pub time_spent: Option<Duration>,
}

impl StudySession {
    /// Open a session starting now.
    pub fn start(user: UserId) -> Self {
        Self {
            id: SessionId::new(),
            user,
            start_time: chrono::Utc::now(),
            end_time: None,
            time_spent: None,
        }
    }

    /// Validate the session window. `end_time` must not precede
    /// `start_time`, and `time_spent` must fit inside the window.
    pub fn validate(&self) -> Result<(), String> {
        match (self.end_time, self.time_spent) {
            (None, Some(_)) => {
                return Err("time_spent requires a closed session".to_string());
            }
            (Some(end), spent) => {
                if end < self.start_time {
                    return Err("end time precedes start time".to_string());
                }
                if let Some(spent) = spent {
                    let window = (end - self.start_time)
                        .to_std()
                        .map_err(|_| "end time precedes start time".to_string())?;
                    if spent > window {
                        return Err("time spent exceeds the session window".to_string());
                    }
                }
            }
            (None, None) => {}
        }
        Ok(())
    }
}

/// A delta applied to an achievement record during a study session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementChange {
    /// Unique identifier
    pub id: ChangeId,

    /// The session the change happened in
    pub session_id: SessionId,

    /// The achievement record the delta was applied to
    pub achievement_id: AchievementId,

    /// Signed delta applied to the record's value
    pub value: Decimal,

    /// When the change was recorded
    pub recorded_at: Time,
}

impl AchievementChange {
    /// Record a change.
    pub fn new(session_id: SessionId, achievement_id: AchievementId, value: Decimal) -> Self {
        Self {
            id: ChangeId::new(),
            session_id,
            achievement_id,
            value,
            recorded_at: chrono::Utc::now(),
        }
    }
}
