use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::test_answer::TestAnswer;
use crate::models::test_attempt::{AttemptMode, TestAttempt};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStudyTestRequest {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
    pub test_content: String,
    pub solutions_content: String,
    #[validate(range(min = 0))]
    pub question_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartAttemptRequest {
    pub mode: AttemptMode,
    #[validate(range(min = 1))]
    pub timer_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    #[validate(range(min = 1))]
    pub question_number: i64,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(range(min = 0))]
    pub score: i64,
    pub time_spent_seconds: Option<i64>,
    /// Exam mode sends the whole answer set at the end; practice mode has
    /// already saved answers one at a time.
    #[validate(nested)]
    pub answers: Option<Vec<SaveAnswerRequest>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptDetailResponse {
    pub attempt: TestAttempt,
    pub answers: Vec<TestAnswer>,
}
