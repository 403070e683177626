use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One mutable row per user. The balance only moves inside the same
/// transaction as the owning payment's status change, and every mutation
/// bumps `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: i64,
    /// Non-negative credit balance.
    pub balance: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// The view of a user who has never been credited. Accounts are
    /// created lazily on first credit, so "no row" means balance zero.
    pub fn empty(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
