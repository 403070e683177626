use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Currency, Gateway, Payment, PaymentStatus, Refund},
    error::{AppError, Result},
    repository::{CurrencyTotal, PaymentRepository},
};

const PAYMENT_COLUMNS: &str = "id, user_id, amount, currency, credits, gateway, status, \
     gateway_reference, idempotency_key, package, description, failure_reason, \
     refund_amount, refund_reason, refund_actor_id, refunded_at, paid_at, \
     created_at, updated_at";

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    user_id: i64,
    amount: i64,
    currency: Currency,
    credits: i64,
    gateway: Gateway,
    status: PaymentStatus,
    gateway_reference: Option<String>,
    idempotency_key: String,
    package: String,
    description: String,
    failure_reason: Option<String>,
    refund_amount: Option<i64>,
    refund_reason: Option<String>,
    refund_actor_id: Option<i64>,
    refunded_at: Option<NaiveDateTime>,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct TotalRow {
    currency: Currency,
    total_amount: i64,
    count: i64,
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        let refund = match (
            row.refund_amount,
            row.refund_reason,
            row.refund_actor_id,
            row.refunded_at,
        ) {
            (Some(amount), Some(reason), Some(actor_id), Some(at)) => Some(Refund {
                amount,
                reason,
                actor_id,
                processed_at: DateTime::from_naive_utc_and_offset(at, Utc),
            }),
            _ => None,
        };

        Ok(Payment {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            credits: row.credits,
            gateway: row.gateway,
            status: row.status,
            gateway_reference: row.gateway_reference,
            idempotency_key: row.idempotency_key,
            package: row.package,
            description: row.description,
            failure_reason: row.failure_reason,
            refund,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn fetch_one_where(&self, clause: &str, bind: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE {clause}");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        let id_str = payment.id.to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, amount, currency, credits, gateway, status,
                gateway_reference, idempotency_key, package, description,
                failure_reason, paid_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.credits)
        .bind(payment.gateway)
        .bind(payment.status)
        .bind(&payment.gateway_reference)
        .bind(&payment.idempotency_key)
        .bind(&payment.package)
        .bind(&payment.description)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at.map(|dt| dt.naive_utc()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(payment.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created payment".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        self.fetch_one_where("id = ?", &id.to_string()).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        self.fetch_one_where("idempotency_key = ?", key).await
    }

    async fn find_by_reference(
        &self,
        gateway: Gateway,
        reference: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway = ? AND gateway_reference = ?"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(gateway)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>> {
        let mut sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = ?");
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, PaymentRow>(&sql).bind(user_id);
        if let Some(status) = status {
            query = query.bind(status);
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn count_by_user(&self, user_id: i64, status: Option<PaymentStatus>) -> Result<i64> {
        let mut sql = "SELECT COUNT(*) FROM payments WHERE user_id = ?".to_string();
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(user_id);
        if let Some(status) = status {
            query = query.bind(status);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list(
        &self,
        limit: i64,
        offset: i64,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>> {
        let mut sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments");
        if status.is_some() {
            sql.push_str(" WHERE status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, PaymentRow>(&sql);
        if let Some(status) = status {
            query = query.bind(status);
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE status = ? AND created_at < ? ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(PaymentStatus::Pending)
            .bind(cutoff.naive_utc())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn attach_reference(
        &self,
        id: Uuid,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<Payment> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET gateway_reference = ?, idempotency_key = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(reference)
        .bind(idempotency_key)
        .bind(now)
        .bind(id.to_string())
        .bind(PaymentStatus::Pending)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidTransition(format!(
                "payment {} is no longer pending, cannot attach reference",
                id
            )));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve updated payment".to_string()))
    }

    async fn completed_totals(&self) -> Result<Vec<CurrencyTotal>> {
        let rows = sqlx::query_as::<_, TotalRow>(
            r#"
            SELECT currency, SUM(amount) AS total_amount, COUNT(*) AS count
            FROM payments
            WHERE status = ?
            GROUP BY currency
            ORDER BY currency
            "#,
        )
        .bind(PaymentStatus::Completed)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| CurrencyTotal {
                currency: r.currency,
                total_amount: r.total_amount,
                count: r.count,
            })
            .collect())
    }

    async fn mark_completed(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        reference: &str,
    ) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, gateway_reference = ?, paid_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(PaymentStatus::Completed)
        .bind(reference)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .bind(PaymentStatus::Pending)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_failed(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        reason: &str,
    ) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, failure_reason = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(PaymentStatus::Failed)
        .bind(reason)
        .bind(now)
        .bind(id.to_string())
        .bind(PaymentStatus::Pending)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_refunded(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        refund: &Refund,
    ) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, refund_amount = ?, refund_reason = ?,
                refund_actor_id = ?, refunded_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(PaymentStatus::Refunded)
        .bind(refund.amount)
        .bind(&refund.reason)
        .bind(refund.actor_id)
        .bind(refund.processed_at.naive_utc())
        .bind(now)
        .bind(id.to_string())
        .bind(PaymentStatus::Completed)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
