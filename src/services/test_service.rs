use chrono::Utc;
use sqlx::SqlitePool;

use crate::dto::study_test_dto::CreateStudyTestRequest;
use crate::error::Result;
use crate::models::study_test::StudyTest;

#[derive(Clone)]
pub struct StudyTestService {
    pool: SqlitePool,
}

impl StudyTestService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_test(&self, payload: CreateStudyTestRequest) -> Result<StudyTest> {
        let test = sqlx::query_as::<_, StudyTest>(
            r#"
            INSERT INTO study_tests (title, test_content, solutions_content, question_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(payload.title)
        .bind(payload.test_content)
        .bind(payload.solutions_content)
        .bind(payload.question_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(test)
    }

    pub async fn get_test_by_id(&self, test_id: i64) -> Result<StudyTest> {
        let test = sqlx::query_as::<_, StudyTest>("SELECT * FROM study_tests WHERE id = ?")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(test)
    }

    pub async fn list_tests(&self) -> Result<Vec<StudyTest>> {
        let tests = sqlx::query_as::<_, StudyTest>(
            "SELECT * FROM study_tests ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    /// Attempts and their answers go with the test via ON DELETE CASCADE.
    pub async fn delete_test(&self, test_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM study_tests WHERE id = ?")
            .bind(test_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn sample_test(title: &str) -> CreateStudyTestRequest {
        CreateStudyTestRequest {
            title: title.to_string(),
            test_content: "1. Which electrolyte...".to_string(),
            solutions_content: "1. Potassium - because...".to_string(),
            question_count: 25,
        }
    }

    #[tokio::test]
    async fn create_then_fetch_round_trips() {
        let service = StudyTestService::new(setup_pool().await);
        let created = service.create_test(sample_test("Fluids & Electrolytes")).await.unwrap();

        let fetched = service.get_test_by_id(created.id).await.unwrap();
        assert_eq!(fetched.title, "Fluids & Electrolytes");
        assert_eq!(fetched.question_count, 25);
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let service = StudyTestService::new(setup_pool().await);
        let first = service.create_test(sample_test("First")).await.unwrap();
        let second = service.create_test(sample_test("Second")).await.unwrap();

        let tests = service.list_tests().await.unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].id, second.id);
        assert_eq!(tests[1].id, first.id);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let service = StudyTestService::new(setup_pool().await);
        let created = service.create_test(sample_test("To delete")).await.unwrap();

        assert!(service.delete_test(created.id).await.unwrap());
        assert!(!service.delete_test(created.id).await.unwrap());
    }
}
