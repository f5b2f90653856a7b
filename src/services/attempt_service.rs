use chrono::Utc;
use sqlx::SqlitePool;

use crate::dto::study_test_dto::{SaveAnswerRequest, SubmitAttemptRequest};
use crate::error::{Error, Result};
use crate::models::test_answer::TestAnswer;
use crate::models::test_attempt::{AttemptMode, TestAttempt};

#[derive(Debug, serde::Serialize)]
pub struct QuestionAccuracy {
    pub question_number: i64,
    pub correct_count: i64,
    pub total_count: i64,
    pub accuracy: f64,
}

#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum TestAnalytics {
    NoData {
        no_data: bool,
        message: String,
    },
    Stats {
        completed_attempts: i64,
        best_percentage: i64,
        average_percentage: f64,
        latest_percentage: i64,
        question_accuracy: Vec<QuestionAccuracy>,
    },
}

pub fn score_percentage(score: i64, total: i64) -> i64 {
    if total > 0 {
        (((score as f64 / total as f64) * 100.0).round() as i64).clamp(0, 100)
    } else {
        0
    }
}

#[derive(Clone)]
pub struct AttemptService {
    pool: SqlitePool,
}

impl AttemptService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `total_questions` is snapshotted from the test here and never changes
    /// for the life of the attempt.
    pub async fn start_attempt(
        &self,
        test_id: i64,
        mode: AttemptMode,
        timer_minutes: Option<i64>,
    ) -> Result<TestAttempt> {
        let question_count: Option<i64> =
            sqlx::query_scalar("SELECT question_count FROM study_tests WHERE id = ?")
                .bind(test_id)
                .fetch_optional(&self.pool)
                .await?;
        let total_questions =
            question_count.ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;

        let attempt = sqlx::query_as::<_, TestAttempt>(
            r#"
            INSERT INTO test_attempts
                (test_id, mode, total_questions, timer_minutes, completed, time_spent_seconds, started_at)
            VALUES (?, ?, ?, ?, 0, 0, ?)
            RETURNING *
            "#,
        )
        .bind(test_id)
        .bind(mode)
        .bind(total_questions)
        .bind(timer_minutes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(attempt)
    }

    pub async fn get_attempt_by_id(&self, attempt_id: i64) -> Result<TestAttempt> {
        let attempt = sqlx::query_as::<_, TestAttempt>("SELECT * FROM test_attempts WHERE id = ?")
            .bind(attempt_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(attempt)
    }

    pub async fn list_attempts_for_test(&self, test_id: i64) -> Result<Vec<TestAttempt>> {
        let attempts = sqlx::query_as::<_, TestAttempt>(
            "SELECT * FROM test_attempts WHERE test_id = ? ORDER BY started_at DESC, id DESC",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    pub async fn get_answers(&self, attempt_id: i64) -> Result<Vec<TestAnswer>> {
        let answers = sqlx::query_as::<_, TestAnswer>(
            "SELECT * FROM test_answers WHERE attempt_id = ? ORDER BY question_number ASC",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    /// Practice mode saves one answer at a time. The correctness flag is
    /// stored as the caller computed it; it is not re-derived here.
    pub async fn save_answer(&self, attempt_id: i64, req: &SaveAnswerRequest) -> Result<TestAnswer> {
        let attempt = self.get_attempt_by_id(attempt_id).await?;
        if attempt.completed {
            return Err(Error::BadRequest(
                "Attempt is already completed".to_string(),
            ));
        }
        self.upsert_answer(attempt_id, req).await
    }

    async fn upsert_answer(&self, attempt_id: i64, req: &SaveAnswerRequest) -> Result<TestAnswer> {
        let answer = sqlx::query_as::<_, TestAnswer>(
            r#"
            INSERT INTO test_answers
                (attempt_id, question_number, user_answer, correct_answer, is_correct, answered_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (attempt_id, question_number) DO UPDATE SET
                user_answer = excluded.user_answer,
                correct_answer = excluded.correct_answer,
                is_correct = excluded.is_correct,
                answered_at = excluded.answered_at
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(req.question_number)
        .bind(&req.user_answer)
        .bind(&req.correct_answer)
        .bind(req.is_correct)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(answer)
    }

    /// Completion is one-way. Score and correctness values come from the
    /// caller; exam mode reveals answers client-side before submitting.
    pub async fn submit_attempt(
        &self,
        attempt_id: i64,
        req: &SubmitAttemptRequest,
    ) -> Result<TestAttempt> {
        let attempt = self.get_attempt_by_id(attempt_id).await?;
        if attempt.completed {
            return Err(Error::BadRequest(
                "Attempt has already been submitted".to_string(),
            ));
        }

        if let Some(answers) = &req.answers {
            for answer in answers {
                self.upsert_answer(attempt_id, answer).await?;
            }
        }

        let percentage = score_percentage(req.score, attempt.total_questions);
        let updated = sqlx::query_as::<_, TestAttempt>(
            r#"
            UPDATE test_attempts
            SET score = ?, percentage = ?, completed = 1, completed_at = ?, time_spent_seconds = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(req.score)
        .bind(percentage)
        .bind(Utc::now())
        .bind(req.time_spent_seconds.unwrap_or(0))
        .bind(attempt_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn delete_attempt(&self, attempt_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM test_attempts WHERE id = ?")
            .bind(attempt_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Aggregate over all completed attempts of a test. With none, reports
    /// the absence of data instead of computing ratios.
    pub async fn analytics_for_test(&self, test_id: i64) -> Result<TestAnalytics> {
        let (completed_attempts, best, average): (i64, Option<i64>, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), MAX(percentage), AVG(percentage) FROM test_attempts WHERE test_id = ? AND completed = 1",
        )
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;

        if completed_attempts == 0 {
            return Ok(TestAnalytics::NoData {
                no_data: true,
                message: "No completed attempts for this test yet".to_string(),
            });
        }

        let latest: i64 = sqlx::query_scalar(
            r#"
            SELECT percentage FROM test_attempts
            WHERE test_id = ? AND completed = 1
            ORDER BY completed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;

        let question_rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT a.question_number, SUM(a.is_correct), COUNT(*)
            FROM test_answers a
            JOIN test_attempts t ON t.id = a.attempt_id
            WHERE t.test_id = ? AND t.completed = 1
            GROUP BY a.question_number
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let mut question_accuracy: Vec<QuestionAccuracy> = question_rows
            .into_iter()
            .map(|(question_number, correct_count, total_count)| QuestionAccuracy {
                question_number,
                correct_count,
                total_count,
                accuracy: round2(correct_count as f64 / total_count as f64 * 100.0),
            })
            .collect();
        // Weakest questions first.
        question_accuracy.sort_by(|a, b| {
            a.accuracy
                .partial_cmp(&b.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.question_number.cmp(&b.question_number))
        });

        Ok(TestAnalytics::Stats {
            completed_attempts,
            best_percentage: best.unwrap_or(0),
            average_percentage: round1(average.unwrap_or(0.0)),
            latest_percentage: latest,
            question_accuracy,
        })
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::study_test_dto::CreateStudyTestRequest;
    use crate::services::test_service::StudyTestService;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn setup_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("Failed to create test pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn seed_test(pool: &SqlitePool, question_count: i64) -> i64 {
        StudyTestService::new(pool.clone())
            .create_test(CreateStudyTestRequest {
                title: "Pharmacology review".to_string(),
                test_content: "1. Which drug...".to_string(),
                solutions_content: "1. B - beta blockers...".to_string(),
                question_count,
            })
            .await
            .unwrap()
            .id
    }

    fn answer(question_number: i64, user_answer: &str, is_correct: bool) -> SaveAnswerRequest {
        SaveAnswerRequest {
            question_number,
            user_answer: user_answer.to_string(),
            correct_answer: "B".to_string(),
            is_correct,
        }
    }

    #[test]
    fn percentage_rounds_and_handles_zero_total() {
        assert_eq!(score_percentage(7, 10), 70);
        assert_eq!(score_percentage(2, 3), 67);
        assert_eq!(score_percentage(1, 3), 33);
        assert_eq!(score_percentage(10, 10), 100);
        assert_eq!(score_percentage(0, 0), 0);
    }

    #[tokio::test]
    async fn start_requires_an_existing_test() {
        let pool = setup_pool().await;
        let service = AttemptService::new(pool.clone());

        let err = service
            .start_attempt(999, AttemptMode::Practice, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM test_attempts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn start_snapshots_the_question_count() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 40).await;
        let service = AttemptService::new(pool);

        let attempt = service
            .start_attempt(test_id, AttemptMode::Exam, Some(60))
            .await
            .unwrap();
        assert_eq!(attempt.total_questions, 40);
        assert_eq!(attempt.timer_minutes, Some(60));
        assert!(!attempt.completed);
        assert!(attempt.score.is_none());
        assert!(attempt.completed_at.is_none());
    }

    #[tokio::test]
    async fn saving_the_same_question_twice_keeps_one_row() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 10).await;
        let service = AttemptService::new(pool.clone());
        let attempt = service
            .start_attempt(test_id, AttemptMode::Practice, None)
            .await
            .unwrap();

        service.save_answer(attempt.id, &answer(3, "A", false)).await.unwrap();
        service.save_answer(attempt.id, &answer(3, "B", true)).await.unwrap();

        let answers = service.get_answers(attempt.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question_number, 3);
        assert_eq!(answers[0].user_answer, "B");
        assert!(answers[0].is_correct);
    }

    #[tokio::test]
    async fn submit_completes_once_and_fixes_the_percentage() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 10).await;
        let service = AttemptService::new(pool);
        let attempt = service
            .start_attempt(test_id, AttemptMode::Exam, None)
            .await
            .unwrap();

        let submitted = service
            .submit_attempt(
                attempt.id,
                &SubmitAttemptRequest {
                    score: 8,
                    time_spent_seconds: Some(540),
                    answers: Some(vec![answer(1, "B", true), answer(2, "C", false)]),
                },
            )
            .await
            .unwrap();
        assert!(submitted.completed);
        assert_eq!(submitted.score, Some(8));
        assert_eq!(submitted.percentage, Some(80));
        assert_eq!(submitted.time_spent_seconds, 540);
        assert!(submitted.completed_at.is_some());

        let answers = service.get_answers(attempt.id).await.unwrap();
        assert_eq!(answers.len(), 2);

        let err = service
            .submit_attempt(
                attempt.id,
                &SubmitAttemptRequest {
                    score: 10,
                    time_spent_seconds: None,
                    answers: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn answers_cannot_be_saved_after_completion() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 5).await;
        let service = AttemptService::new(pool);
        let attempt = service
            .start_attempt(test_id, AttemptMode::Practice, None)
            .await
            .unwrap();
        service
            .submit_attempt(
                attempt.id,
                &SubmitAttemptRequest {
                    score: 5,
                    time_spent_seconds: None,
                    answers: None,
                },
            )
            .await
            .unwrap();

        let err = service
            .save_answer(attempt.id, &answer(1, "A", true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn analytics_reports_no_data_without_completed_attempts() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 10).await;
        let service = AttemptService::new(pool);

        // An in-progress attempt does not count.
        service
            .start_attempt(test_id, AttemptMode::Practice, None)
            .await
            .unwrap();

        let analytics = service.analytics_for_test(test_id).await.unwrap();
        assert!(matches!(analytics, TestAnalytics::NoData { no_data: true, .. }));
    }

    #[tokio::test]
    async fn analytics_aggregates_completed_attempts() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 20).await;
        let service = AttemptService::new(pool);

        // Percentages 70, 85, 90 in completion order.
        for score in [14, 17, 18] {
            let attempt = service
                .start_attempt(test_id, AttemptMode::Exam, None)
                .await
                .unwrap();
            service
                .submit_attempt(
                    attempt.id,
                    &SubmitAttemptRequest {
                        score,
                        time_spent_seconds: None,
                        answers: None,
                    },
                )
                .await
                .unwrap();
        }

        match service.analytics_for_test(test_id).await.unwrap() {
            TestAnalytics::Stats {
                completed_attempts,
                best_percentage,
                average_percentage,
                latest_percentage,
                ..
            } => {
                assert_eq!(completed_attempts, 3);
                assert_eq!(best_percentage, 90);
                assert_eq!(average_percentage, 81.7);
                assert_eq!(latest_percentage, 90);
            }
            TestAnalytics::NoData { .. } => panic!("expected stats"),
        }
    }

    #[tokio::test]
    async fn question_accuracy_sorts_weakest_first() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 3).await;
        let service = AttemptService::new(pool);

        for misses_q2 in [true, true, false] {
            let attempt = service
                .start_attempt(test_id, AttemptMode::Exam, None)
                .await
                .unwrap();
            service
                .submit_attempt(
                    attempt.id,
                    &SubmitAttemptRequest {
                        score: if misses_q2 { 1 } else { 2 },
                        time_spent_seconds: None,
                        answers: Some(vec![
                            answer(1, "B", true),
                            answer(2, "D", !misses_q2),
                        ]),
                    },
                )
                .await
                .unwrap();
        }

        match service.analytics_for_test(test_id).await.unwrap() {
            TestAnalytics::Stats { question_accuracy, .. } => {
                assert_eq!(question_accuracy.len(), 2);
                assert_eq!(question_accuracy[0].question_number, 2);
                assert_eq!(question_accuracy[0].accuracy, 33.33);
                assert_eq!(question_accuracy[0].correct_count, 1);
                assert_eq!(question_accuracy[0].total_count, 3);
                assert_eq!(question_accuracy[1].question_number, 1);
                assert_eq!(question_accuracy[1].accuracy, 100.0);
            }
            TestAnalytics::NoData { .. } => panic!("expected stats"),
        }
    }

    #[tokio::test]
    async fn deleting_a_test_cascades_to_attempts_and_answers() {
        let pool = setup_pool().await;
        let test_id = seed_test(&pool, 5).await;
        let service = AttemptService::new(pool.clone());
        let attempt = service
            .start_attempt(test_id, AttemptMode::Practice, None)
            .await
            .unwrap();
        service.save_answer(attempt.id, &answer(1, "A", true)).await.unwrap();

        StudyTestService::new(pool.clone())
            .delete_test(test_id)
            .await
            .unwrap();

        let attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM test_attempts")
            .fetch_one(&pool)
            .await
            .unwrap();
        let answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM test_answers")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(attempts, 0);
        assert_eq!(answers, 0);
    }
}
