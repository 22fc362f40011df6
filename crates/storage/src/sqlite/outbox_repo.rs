use exam_core::model::{AnswerRecord, RecordId, TestId, UserId};
use sqlx::Row;

use super::SqliteOutbox;
use crate::repository::{AnswerOutbox, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl AnswerOutbox for SqliteOutbox {
    async fn stage(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        let body = serde_json::to_string(record).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO answer_outbox (id, user_id, test_id, question_id, record, submitted_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    record = excluded.record,
                    submitted_at = excluded.submitted_at
            ",
        )
        .bind(record.id.as_str())
        .bind(record.user_id.as_str())
        .bind(record.solved_during_test.test_id.as_str())
        .bind(record.question_id.as_str())
        .bind(body)
        .bind(record.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn remove(&self, id: &RecordId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM answer_outbox WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn pending(
        &self,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT record
                FROM answer_outbox
                WHERE user_id = ?1 AND test_id = ?2
                ORDER BY submitted_at ASC, id ASC
            ",
        )
        .bind(user_id.as_str())
        .bind(test_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| {
                let body: String = row.try_get("record").map_err(ser)?;
                serde_json::from_str(&body).map_err(ser)
            })
            .collect()
    }
}
