use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::{
    domain::{IdempotencyRecord, PaymentStatus},
    error::{AppError, Result},
    repository::IdempotencyRepository,
};

#[derive(FromRow)]
struct RecordRow {
    key: String,
    result_status: PaymentStatus,
    first_seen_at: NaiveDateTime,
}

pub struct SqliteIdempotencyRepository {
    pool: SqlitePool,
}

impl SqliteIdempotencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: RecordRow) -> IdempotencyRecord {
        IdempotencyRecord {
            key: row.key,
            result_status: row.result_status,
            first_seen_at: DateTime::from_naive_utc_and_offset(row.first_seen_at, Utc),
        }
    }
}

#[async_trait]
impl IdempotencyRepository for SqliteIdempotencyRepository {
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT key, result_status, first_seen_at
            FROM idempotency_records
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Self::row_to_record))
    }

    async fn find_in(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT key, result_status, first_seen_at
            FROM idempotency_records
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Self::row_to_record))
    }

    async fn admit(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
        result: PaymentStatus,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        // The primary key makes this the atomic check-and-set: exactly
        // one of any number of racing admissions inserts the row.
        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, result_status, first_seen_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(result)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(inserted.rows_affected() == 1)
    }
}
