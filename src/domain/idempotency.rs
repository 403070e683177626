use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::PaymentStatus;

/// Marks a gateway event as admitted. Exactly one payment transition may
/// occur under a given key; replays read back the recorded result instead
/// of re-executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// Terminal status produced when the key was first processed.
    pub result_status: PaymentStatus,
    pub first_seen_at: DateTime<Utc>,
}
