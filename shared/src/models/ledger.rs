//! Stock ledger models and the stock arithmetic every ledger append goes through

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why a ledger entry exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Stock counted in (or corrected) by a user; `source_ref` is the input id
    ManualInput,
    /// Stock held for an order line; `source_ref` is the order item id
    OrderReservation,
    /// Reserved stock handed back on cancellation; `source_ref` is the order item id
    OrderRelease,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ManualInput => "manual_input",
            SourceKind::OrderReservation => "order_reservation",
            SourceKind::OrderRelease => "order_release",
        }
    }

    /// Source kind carried by the entry that undoes an entry of this kind.
    pub fn reversal_kind(&self) -> SourceKind {
        match self {
            SourceKind::ManualInput => SourceKind::ManualInput,
            SourceKind::OrderReservation | SourceKind::OrderRelease => SourceKind::OrderRelease,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_input" => Ok(SourceKind::ManualInput),
            "order_reservation" => Ok(SourceKind::OrderReservation),
            "order_release" => Ok(SourceKind::OrderRelease),
            other => Err(format!("unknown ledger source kind '{}'", other)),
        }
    }
}

/// One immutable, signed stock change.
///
/// The only field that ever changes after insertion is `reversed`, which is
/// flipped exactly once when a compensating entry is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockLedgerEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub delta: Decimal,
    pub source_kind: SourceKind,
    pub source_ref: Uuid,
    pub actor_id: Uuid,
    /// Set on compensating entries; points at the entry being undone
    pub reverses_entry_id: Option<Uuid>,
    pub reversed: bool,
    pub created_at: DateTime<Utc>,
}

impl StockLedgerEntry {
    pub fn is_reversal(&self) -> bool {
        self.reverses_entry_id.is_some()
    }

    /// Build the compensating entry for this one.
    pub fn reversal(&self, actor_id: Uuid) -> Result<NewLedgerEntry, StockError> {
        if self.reversed {
            return Err(StockError::AlreadyReversed(self.id));
        }
        if self.is_reversal() {
            return Err(StockError::ReversalOfReversal(self.id));
        }
        Ok(NewLedgerEntry {
            product_id: self.product_id,
            delta: -self.delta,
            source_kind: self.source_kind.reversal_kind(),
            source_ref: self.source_ref,
            actor_id,
            reverses_entry_id: Some(self.id),
        })
    }
}

/// A ledger entry that has been validated but not yet appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub product_id: Uuid,
    pub delta: Decimal,
    pub source_kind: SourceKind,
    pub source_ref: Uuid,
    pub actor_id: Uuid,
    pub reverses_entry_id: Option<Uuid>,
}

impl NewLedgerEntry {
    pub fn new(
        product_id: Uuid,
        delta: Decimal,
        source_kind: SourceKind,
        source_ref: Uuid,
        actor_id: Uuid,
    ) -> Result<Self, StockError> {
        if delta.is_zero() {
            return Err(StockError::ZeroDelta);
        }
        Ok(Self {
            product_id,
            delta,
            source_kind,
            source_ref,
            actor_id,
            reverses_entry_id: None,
        })
    }

    pub fn movement(&self) -> StockMovement {
        StockMovement {
            product_id: self.product_id,
            delta: self.delta,
        }
    }
}

/// Rejections raised by the stock arithmetic
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StockError {
    #[error("insufficient stock for product {product_id}: available {available}, change {delta}")]
    Insufficient {
        product_id: Uuid,
        available: Decimal,
        delta: Decimal,
    },

    #[error("ledger entry {0} is already reversed")]
    AlreadyReversed(Uuid),

    #[error("ledger entry {0} is a reversal and cannot be reversed")]
    ReversalOfReversal(Uuid),

    #[error("product {0} is not held in this stock book")]
    UnknownProduct(Uuid),

    #[error("stock change must be non-zero")]
    ZeroDelta,
}

/// A signed stock change against one product
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub delta: Decimal,
}

/// Apply `delta` to `current`, refusing to go below zero.
pub fn apply_delta(product_id: Uuid, current: Decimal, delta: Decimal) -> Result<Decimal, StockError> {
    let next = current + delta;
    if next < Decimal::ZERO {
        return Err(StockError::Insufficient {
            product_id,
            available: current,
            delta,
        });
    }
    Ok(next)
}

/// Stock levels of the products locked by one transaction.
///
/// The backend fills a book from the rows it holds `FOR UPDATE`, runs every
/// movement of a command through it, and writes back only if the whole batch
/// was accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockBook {
    levels: BTreeMap<Uuid, Decimal>,
}

impl StockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product_id: Uuid, level: Decimal) {
        self.levels.insert(product_id, level);
    }

    pub fn level(&self, product_id: Uuid) -> Option<Decimal> {
        self.levels.get(&product_id).copied()
    }

    pub fn levels(&self) -> impl Iterator<Item = (Uuid, Decimal)> + '_ {
        self.levels.iter().map(|(id, level)| (*id, *level))
    }

    /// Apply a single movement.
    pub fn apply(&mut self, movement: StockMovement) -> Result<Decimal, StockError> {
        let current = self
            .levels
            .get(&movement.product_id)
            .copied()
            .ok_or(StockError::UnknownProduct(movement.product_id))?;
        let next = apply_delta(movement.product_id, current, movement.delta)?;
        self.levels.insert(movement.product_id, next);
        Ok(next)
    }

    /// Apply movements in order, all or nothing.
    ///
    /// Returns the level reached after each movement. On error the book is
    /// left exactly as it was.
    pub fn apply_all(&mut self, movements: &[StockMovement]) -> Result<Vec<Decimal>, StockError> {
        let mut staged = self.clone();
        let mut after = Vec::with_capacity(movements.len());
        for movement in movements {
            after.push(staged.apply(*movement)?);
        }
        *self = staged;
        Ok(after)
    }
}

/// Distinct product ids in the order their locks must be taken.
///
/// Every multi-product command locks in ascending id order so two commands
/// touching the same products can never wait on each other in a cycle.
pub fn lock_order<I>(product_ids: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut ids: Vec<Uuid> = product_ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Stock implied by a product's ledger history.
///
/// Counts entries that are neither reversed nor reversals; a reversal pair
/// contributes nothing. Equal to the plain sum of all deltas.
pub fn project_stock<'a, I>(entries: I) -> Decimal
where
    I: IntoIterator<Item = &'a StockLedgerEntry>,
{
    entries
        .into_iter()
        .filter(|e| !e.reversed && !e.is_reversal())
        .map(|e| e.delta)
        .sum()
}
