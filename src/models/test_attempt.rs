use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttemptMode {
    /// Answers arrive in bulk on submit.
    Exam,
    /// Answers are saved one at a time and the attempt can be resumed.
    Practice,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestAttempt {
    pub id: i64,
    pub test_id: i64,
    pub mode: AttemptMode,
    pub score: Option<i64>,
    pub total_questions: i64,
    pub percentage: Option<i64>,
    pub time_spent_seconds: i64,
    pub timer_minutes: Option<i64>,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
