use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::ids::{QuestionId, RecordId, UserId};
use crate::model::test_meta::TestMeta;

// Fixed namespace so record ids are stable across processes and releases.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_9b4d_4e07_8c55_d0e1_7f2a_9b31);

/// Which attempt answer records belong to. Resolved once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptContext {
    /// Taken inside the scheduled window; bound to the scheduled start.
    Live { scheduled_start: DateTime<Utc> },
    /// Taken after the window lapsed; bound to the moment the session mounted.
    Practice { mounted_at: DateTime<Utc> },
}

impl AttemptContext {
    /// Live while the scheduled window is still open at `mounted_at`, practice afterwards.
    #[must_use]
    pub fn resolve(test: &TestMeta, mounted_at: DateTime<Utc>) -> Self {
        if test.has_ended(mounted_at) {
            Self::Practice { mounted_at }
        } else {
            Self::Live {
                scheduled_start: test.scheduled_start,
            }
        }
    }

    /// Timestamp distinguishing attempts at the same test by the same user.
    #[must_use]
    pub fn effective_attempt(&self) -> DateTime<Utc> {
        match self {
            Self::Live { scheduled_start } => *scheduled_start,
            Self::Practice { mounted_at } => *mounted_at,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// Identifier derived only from (user, question, attempt).
    #[must_use]
    pub fn record_id(&self, user: &UserId, question: &QuestionId) -> RecordId {
        let name = format!(
            "{user}:{question}:{}",
            self.effective_attempt().timestamp_millis()
        );
        RecordId::new(Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes()).to_string())
    }
}
