//! Stock ledger service: the only writer of product stock
//!
//! Every stock change is an appended ledger row plus the matching update of
//! the product's cached stock, done in one transaction while the product row
//! is held `FOR UPDATE`. Commands that touch several products lock them in
//! ascending id order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    lock_order, project_stock, NewLedgerEntry, SourceKind, StockBook, StockLedgerEntry,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Ledger service for recording, reversing and reading stock changes
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
    lock_timeout: Duration,
}

/// Row for ledger queries
#[derive(Debug, FromRow)]
pub(crate) struct LedgerRow {
    id: Uuid,
    product_id: Uuid,
    delta: Decimal,
    source_kind: String,
    source_ref: Uuid,
    actor_id: Uuid,
    reverses_entry_id: Option<Uuid>,
    reversed: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for StockLedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let source_kind = row
            .source_kind
            .parse::<SourceKind>()
            .map_err(AppError::InvariantViolation)?;
        Ok(StockLedgerEntry {
            id: row.id,
            product_id: row.product_id,
            delta: row.delta,
            source_kind,
            source_ref: row.source_ref,
            actor_id: row.actor_id,
            reverses_entry_id: row.reverses_entry_id,
            reversed: row.reversed,
            created_at: row.created_at,
        })
    }
}

pub(crate) const LEDGER_COLUMNS: &str =
    "id, product_id, delta, source_kind, source_ref, actor_id, reverses_entry_id, reversed, created_at";

/// Cached stock compared with the stock implied by the ledger
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReconciliation {
    pub product_id: Uuid,
    pub cached: Decimal,
    pub projected: Decimal,
    pub entry_count: usize,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Append a stock change for one product.
    #[tracing::instrument(skip(self), fields(product_id = %product_id, delta = %delta))]
    pub async fn record(
        &self,
        product_id: Uuid,
        delta: Decimal,
        source_kind: SourceKind,
        source_ref: Uuid,
        actor_id: Uuid,
    ) -> AppResult<StockLedgerEntry> {
        let entry = NewLedgerEntry::new(product_id, delta, source_kind, source_ref, actor_id)?;

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        let mut book = lock_products(&mut tx, &[product_id], LockMode::ActiveOnly).await?;
        let mut appended = append_entries(&mut tx, &mut book, &[entry]).await?;
        tx.commit().await?;

        appended
            .pop()
            .ok_or_else(|| AppError::Internal("ledger append returned no entry".to_string()))
    }

    /// Undo an entry by appending its negation.
    #[tracing::instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn reverse(&self, entry_id: Uuid, actor_id: Uuid) -> AppResult<StockLedgerEntry> {
        let mut tx = self.db.begin().await?;
        let (source_kind, order_id) = sqlx::query_as::<_, (String, Option<Uuid>)>(
            r#"
            SELECT e.source_kind, i.order_id
            FROM stock_ledger_entries e
            LEFT JOIN order_items i ON i.id = e.source_ref
            WHERE e.id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ledger entry {}", entry_id)))?;

        // Reservations belong to their order and are only released by cancelling it
        if source_kind == SourceKind::OrderReservation.as_str() {
            return Err(AppError::ReservationHeldByOrder { entry_id, order_id });
        }

        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        let reversal = reverse_entry(&mut tx, entry_id, actor_id).await?;
        tx.commit().await?;
        Ok(reversal)
    }

    /// Ledger entries of a product, newest first, optionally bounded in time.
    pub async fn history(
        &self,
        product_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StockLedgerEntry>> {
        let product_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.db)
                .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM stock_ledger_entries
            WHERE product_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC, seq DESC
            "#
        ))
        .bind(product_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockLedgerEntry::try_from).collect()
    }

    /// Compare a product's cached stock with its ledger history.
    pub async fn reconcile(&self, product_id: Uuid) -> AppResult<StockReconciliation> {
        let mut tx = self.db.begin().await?;
        // Share lock keeps writers out while the two reads are compared
        let cached = sqlx::query_scalar::<_, Decimal>(
            "SELECT stock FROM products WHERE id = $1 FOR SHARE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let entries: Vec<StockLedgerEntry> = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger_entries WHERE product_id = $1"
        ))
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(StockLedgerEntry::try_from)
        .collect::<AppResult<_>>()?;
        tx.commit().await?;

        let projected = project_stock(&entries);
        if projected != cached {
            tracing::error!(
                product_id = %product_id,
                cached = %cached,
                projected = %projected,
                "Cached stock drifted from ledger"
            );
            return Err(AppError::InvariantViolation(format!(
                "product {} caches stock {} but its ledger sums to {}",
                product_id, cached, projected
            )));
        }

        Ok(StockReconciliation {
            product_id,
            cached,
            projected,
            entry_count: entries.len(),
        })
    }
}

/// Whether soft-deleted products may be locked for a stock change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    /// New stock changes: deleted products are not found
    ActiveOnly,
    /// Reversals: stock returns to a product even after it was deleted
    IncludeDeleted,
}

/// Bound every lock wait in the current transaction.
pub(crate) async fn set_lock_timeout(conn: &mut PgConnection, timeout: Duration) -> AppResult<()> {
    // SET does not take bind parameters; the value is an integer we format ourselves
    sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis()))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Lock product rows in ascending id order and load their stock.
pub(crate) async fn lock_products(
    conn: &mut PgConnection,
    product_ids: &[Uuid],
    mode: LockMode,
) -> AppResult<StockBook> {
    let mut book = StockBook::new();
    for product_id in lock_order(product_ids.iter().copied()) {
        let (stock, is_deleted) = sqlx::query_as::<_, (Decimal, bool)>(
            "SELECT stock, is_deleted FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;

        if is_deleted && mode == LockMode::ActiveOnly {
            return Err(AppError::NotFound(format!("Product {}", product_id)));
        }
        book.insert(product_id, stock);
    }
    Ok(book)
}

/// Run entries through the stock book, then persist them and the new stock levels.
///
/// Products must already be locked into `book`. Nothing is written unless
/// every entry is accepted.
pub(crate) async fn append_entries(
    conn: &mut PgConnection,
    book: &mut StockBook,
    entries: &[NewLedgerEntry],
) -> AppResult<Vec<StockLedgerEntry>> {
    let movements: Vec<_> = entries.iter().map(NewLedgerEntry::movement).collect();
    if let Err(err) = book.apply_all(&movements) {
        tracing::warn!(error = %err, "Stock change rejected");
        return Err(err.into());
    }

    let mut appended = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(original) = entry.reverses_entry_id {
            let marked = sqlx::query(
                "UPDATE stock_ledger_entries SET reversed = TRUE WHERE id = $1 AND NOT reversed",
            )
            .bind(original)
            .execute(&mut *conn)
            .await?;
            if marked.rows_affected() != 1 {
                return Err(AppError::NotFound(format!(
                    "Unreversed ledger entry {}",
                    original
                )));
            }
        }

        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"
            INSERT INTO stock_ledger_entries (
                product_id, delta, source_kind, source_ref, actor_id, reverses_entry_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(entry.product_id)
        .bind(entry.delta)
        .bind(entry.source_kind.as_str())
        .bind(entry.source_ref)
        .bind(entry.actor_id)
        .bind(entry.reverses_entry_id)
        .fetch_one(&mut *conn)
        .await?;

        let appended_entry = StockLedgerEntry::try_from(row)?;
        tracing::info!(
            entry_id = %appended_entry.id,
            product_id = %appended_entry.product_id,
            delta = %appended_entry.delta,
            source_kind = %appended_entry.source_kind,
            "Ledger entry appended"
        );
        appended.push(appended_entry);
    }

    for product_id in lock_order(entries.iter().map(|e| e.product_id)) {
        let level = book
            .level(product_id)
            .ok_or(shared::StockError::UnknownProduct(product_id))?;
        sqlx::query("UPDATE products SET stock = $1, updated_at = NOW() WHERE id = $2")
            .bind(level)
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(appended)
}

/// Load a ledger entry and hold it for the rest of the transaction.
pub(crate) async fn fetch_entry_for_update(
    conn: &mut PgConnection,
    entry_id: Uuid,
) -> AppResult<StockLedgerEntry> {
    let row = sqlx::query_as::<_, LedgerRow>(&format!(
        "SELECT {LEDGER_COLUMNS} FROM stock_ledger_entries WHERE id = $1 FOR UPDATE"
    ))
    .bind(entry_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Ledger entry {}", entry_id)))?;
    StockLedgerEntry::try_from(row)
}

/// Reverse one entry inside an open transaction.
async fn reverse_entry(
    conn: &mut PgConnection,
    entry_id: Uuid,
    actor_id: Uuid,
) -> AppResult<StockLedgerEntry> {
    let product_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT product_id FROM stock_ledger_entries WHERE id = $1",
    )
    .bind(entry_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Ledger entry {}", entry_id)))?;

    // Product first, entry second: the same order every writer uses
    let mut book = lock_products(conn, &[product_id], LockMode::IncludeDeleted).await?;
    let original = fetch_entry_for_update(conn, entry_id).await?;
    let reversal = original.reversal(actor_id)?;

    let mut appended = append_entries(conn, &mut book, &[reversal]).await?;
    appended
        .pop()
        .ok_or_else(|| AppError::Internal("ledger append returned no entry".to_string()))
}
