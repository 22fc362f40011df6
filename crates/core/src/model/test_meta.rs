use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::TestId;

/// Points awarded per outcome. Scoring itself happens server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkingScheme {
    pub correct: i32,
    pub incorrect: i32,
    #[serde(default)]
    pub unattempted: i32,
}

impl Default for MarkingScheme {
    fn default() -> Self {
        Self {
            correct: 4,
            incorrect: -1,
            unattempted: 0,
        }
    }
}

/// Scheduled test as described by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMeta {
    pub id: TestId,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub marking_scheme: MarkingScheme,
    pub test_type: String,
}

impl TestMeta {
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    #[must_use]
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_start + self.duration()
    }

    /// True once `now` has reached the scheduled end.
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_end()
    }

    /// Whole seconds left in the scheduled window, clamped to the duration.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        let remaining = (self.scheduled_end() - now).num_seconds();
        let total = self.duration().num_seconds();
        u64::try_from(remaining.min(total)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn meta() -> TestMeta {
        TestMeta {
            id: TestId::new("t1"),
            title: "Mock 1".into(),
            scheduled_start: fixed_now(),
            duration_minutes: 180,
            marking_scheme: MarkingScheme::default(),
            test_type: "mock".into(),
        }
    }

    #[test]
    fn end_is_start_plus_duration() {
        let t = meta();
        assert_eq!(t.scheduled_end(), fixed_now() + Duration::hours(3));
        assert!(!t.has_ended(fixed_now() + Duration::minutes(179)));
        assert!(t.has_ended(fixed_now() + Duration::minutes(180)));
    }

    #[test]
    fn remaining_is_clamped() {
        let t = meta();
        assert_eq!(t.remaining_secs(fixed_now() - Duration::hours(1)), 3 * 3600);
        assert_eq!(t.remaining_secs(fixed_now() + Duration::hours(4)), 0);
        assert_eq!(t.remaining_secs(fixed_now() + Duration::hours(2)), 3600);
    }
}
