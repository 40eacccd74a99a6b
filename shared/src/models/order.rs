//! Order lifecycle models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::Unit;
use crate::types::round_money;

/// Lifecycle state of an order, stored alongside its audit timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Upcoming,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Upcoming,
        OrderStatus::InProgress,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Upcoming => "upcoming",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Indonesian label shown by the client
    pub fn label_id(&self) -> &'static str {
        match self {
            OrderStatus::Upcoming => "Mendatang",
            OrderStatus::InProgress => "Dalam Proses",
            OrderStatus::Completed => "Selesai",
            OrderStatus::Cancelled => "Dibatalkan",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Next state for `action`, or the reason the move is not allowed.
    pub fn apply(self, action: OrderAction) -> Result<OrderStatus, TransitionError> {
        match (self, action) {
            (OrderStatus::Upcoming, OrderAction::Start) => Ok(OrderStatus::InProgress),
            (OrderStatus::InProgress, OrderAction::Finish) => Ok(OrderStatus::Completed),
            (OrderStatus::Upcoming | OrderStatus::InProgress, OrderAction::Cancel) => {
                Ok(OrderStatus::Cancelled)
            }
            (from, action) => Err(TransitionError { from, action }),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(OrderStatus::Upcoming),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// Commands that move an order through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Start,
    Finish,
    Cancel,
}

impl OrderAction {
    pub const ALL: [OrderAction; 3] = [OrderAction::Start, OrderAction::Finish, OrderAction::Cancel];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Start => "start",
            OrderAction::Finish => "finish",
            OrderAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle move attempted from a state that does not permit it
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cannot {action} an order that is {from}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub action: OrderAction,
}

/// Stored order state that contradicts itself
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("order has both finishedAt and cancelledAt set")]
    ConflictingTerminalTimestamps,

    #[error("order has finishedAt set without startedAt")]
    FinishedWithoutStart,

    #[error("stored status {stored} disagrees with timestamps implying {derived}")]
    StatusMismatch {
        stored: OrderStatus,
        derived: OrderStatus,
    },
}

/// Audit timestamps kept next to the stored status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderTimestamps {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl OrderTimestamps {
    /// Status implied by which timestamps are set.
    pub fn derive_status(&self) -> Result<OrderStatus, IntegrityError> {
        match (self.started_at, self.finished_at, self.cancelled_at) {
            (_, Some(_), Some(_)) => Err(IntegrityError::ConflictingTerminalTimestamps),
            (None, Some(_), None) => Err(IntegrityError::FinishedWithoutStart),
            (_, None, Some(_)) => Ok(OrderStatus::Cancelled),
            (Some(_), Some(_), None) => Ok(OrderStatus::Completed),
            (Some(_), None, None) => Ok(OrderStatus::InProgress),
            (None, None, None) => Ok(OrderStatus::Upcoming),
        }
    }

    /// Stamp the timestamp that `action` writes.
    pub fn record(&mut self, action: OrderAction, at: DateTime<Utc>) {
        match action {
            OrderAction::Start => self.started_at = Some(at),
            OrderAction::Finish => self.finished_at = Some(at),
            OrderAction::Cancel => self.cancelled_at = Some(at),
        }
    }
}

/// Check a stored status against the timestamps written next to it.
pub fn verify_status(
    stored: OrderStatus,
    timestamps: &OrderTimestamps,
) -> Result<OrderStatus, IntegrityError> {
    let derived = timestamps.derive_status()?;
    if derived != stored {
        return Err(IntegrityError::StatusMismatch { stored, derived });
    }
    Ok(stored)
}

/// A customer order and its lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub timestamps: OrderTimestamps,
    pub total_buy_price: Decimal,
    pub total_sell_price: Decimal,
    pub items: Vec<OrderItem>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One order line. Product details are copied at order time so the order
/// stays readable after the product is edited or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub unique_code: String,
    pub name: String,
    pub image: Option<String>,
    pub unit: Unit,
    pub quantity: Decimal,
    pub total_buy_price: Decimal,
    pub total_sell_price: Decimal,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Buy and sell value of a line or an order
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub buy: Decimal,
    pub sell: Decimal,
}

impl Totals {
    /// Line value at unit prices, each side rounded to two places.
    pub fn for_line(buy_price: Decimal, sell_price: Decimal, quantity: Decimal) -> Self {
        Self {
            buy: round_money(buy_price * quantity),
            sell: round_money(sell_price * quantity),
        }
    }

    pub fn sum<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a Totals>,
    {
        lines.into_iter().fold(Totals::default(), |acc, line| Totals {
            buy: acc.buy + line.buy,
            sell: acc.sell + line.sell,
        })
    }

    pub fn margin(&self) -> Decimal {
        self.sell - self.buy
    }
}
