use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::{
    domain::CreditAccount,
    error::{AppError, Result},
    repository::CreditAccountRepository,
};

#[derive(FromRow)]
struct AccountRow {
    user_id: i64,
    balance: i64,
    version: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteCreditAccountRepository {
    pool: SqlitePool,
}

impl SqliteCreditAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: AccountRow) -> CreditAccount {
        CreditAccount {
            user_id: row.user_id,
            balance: row.balance,
            version: row.version,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        }
    }

    async fn ensure_exists(conn: &mut SqliteConnection, user_id: i64) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO credit_accounts (user_id, balance, version, created_at, updated_at)
            VALUES (?, 0, 0, ?, ?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl CreditAccountRepository for SqliteCreditAccountRepository {
    async fn find(&self, user_id: i64) -> Result<Option<CreditAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT user_id, balance, version, created_at, updated_at
            FROM credit_accounts
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Self::row_to_account))
    }

    async fn credit(&self, conn: &mut SqliteConnection, user_id: i64, credits: i64) -> Result<()> {
        Self::ensure_exists(conn, user_id).await?;

        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE credit_accounts
            SET balance = balance + ?, version = version + 1, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(credits)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() != 1 {
            return Err(AppError::Database(format!(
                "credit for user {} touched {} rows",
                user_id,
                result.rows_affected()
            )));
        }

        Ok(())
    }

    async fn debit(&self, conn: &mut SqliteConnection, user_id: i64, credits: i64) -> Result<bool> {
        let now = Utc::now().naive_utc();
        // The balance guard is part of the statement, so a concurrent
        // spend can never drive the balance negative.
        let result = sqlx::query(
            r#"
            UPDATE credit_accounts
            SET balance = balance - ?, version = version + 1, updated_at = ?
            WHERE user_id = ? AND balance >= ?
            "#,
        )
        .bind(credits)
        .bind(now)
        .bind(user_id)
        .bind(credits)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
