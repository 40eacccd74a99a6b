//! Stock input models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Unit;

/// A manual stock count-in or correction.
///
/// Its effect on stock lives in the ledger entry it points at; editing the
/// input reverses that entry and records a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockInput {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub unit: Unit,
    pub note: Option<String>,
    pub ledger_entry_id: Uuid,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
