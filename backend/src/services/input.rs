//! Manual stock input service
//!
//! An input is a count-in or correction typed in by staff. Its stock effect
//! is a single `manual_input` ledger entry; edits and deletions go through
//! reversals so the ledger keeps the full story.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{validate_input_amount, NewLedgerEntry, SourceKind, StockInput, Unit};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::ledger::{
    append_entries, fetch_entry_for_update, lock_products, set_lock_timeout, LockMode,
};
use crate::error::{AppError, AppResult};

/// Input service for recording stock count-ins and corrections
#[derive(Clone)]
pub struct InputService {
    db: PgPool,
    lock_timeout: Duration,
}

#[derive(Debug, FromRow)]
struct InputRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    unit: String,
    note: Option<String>,
    ledger_entry_id: Uuid,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InputRow> for StockInput {
    type Error = AppError;

    fn try_from(row: InputRow) -> Result<Self, Self::Error> {
        let unit = row
            .unit
            .parse::<Unit>()
            .map_err(AppError::InvariantViolation)?;
        Ok(StockInput {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            amount: row.amount,
            unit,
            note: row.note,
            ledger_entry_id: row.ledger_entry_id,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const INPUT_COLUMNS: &str =
    "id, product_id, user_id, amount, unit, note, ledger_entry_id, is_deleted, created_at, updated_at";

/// Input for recording stock
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInputRequest {
    pub product_id: Uuid,
    /// Positive to add stock, negative to correct it down
    pub amount: Decimal,
    pub unit: Unit,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Input for correcting a recorded amount
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInputRequest {
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl InputService {
    /// Create a new InputService instance
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Record a stock input and its ledger entry in one transaction
    #[tracing::instrument(skip(self, input), fields(product_id = %input.product_id, amount = %input.amount))]
    pub async fn create(&self, actor_id: Uuid, input: CreateInputRequest) -> AppResult<StockInput> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        let mut book = lock_products(&mut tx, &[input.product_id], LockMode::ActiveOnly).await?;

        let unit = product_unit(&mut tx, input.product_id).await?;
        check_amount(input.amount, input.unit, unit)?;

        let input_id = Uuid::new_v4();
        let entry = NewLedgerEntry::new(
            input.product_id,
            input.amount,
            SourceKind::ManualInput,
            input_id,
            actor_id,
        )?;
        let appended = append_entries(&mut tx, &mut book, &[entry]).await?;
        let ledger_entry_id = appended
            .first()
            .map(|e| e.id)
            .ok_or_else(|| AppError::Internal("ledger append returned no entry".to_string()))?;

        let row = sqlx::query_as::<_, InputRow>(&format!(
            r#"
            INSERT INTO stock_inputs (id, product_id, user_id, amount, unit, note, ledger_entry_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INPUT_COLUMNS}
            "#
        ))
        .bind(input_id)
        .bind(input.product_id)
        .bind(actor_id)
        .bind(input.amount)
        .bind(unit.as_str())
        .bind(&input.note)
        .bind(ledger_entry_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        StockInput::try_from(row)
    }

    /// Correct an input: its entry is reversed and a new one recorded
    #[tracing::instrument(skip(self, input), fields(input_id = %input_id, amount = %input.amount))]
    pub async fn update(
        &self,
        actor_id: Uuid,
        input_id: Uuid,
        input: UpdateInputRequest,
    ) -> AppResult<StockInput> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        let existing = self.lock_input(&mut tx, input_id).await?;

        let mut book =
            lock_products(&mut tx, &[existing.product_id], LockMode::ActiveOnly).await?;
        let unit = product_unit(&mut tx, existing.product_id).await?;
        check_amount(input.amount, existing.unit, unit)?;

        let current = fetch_entry_for_update(&mut tx, existing.ledger_entry_id).await?;
        let replacement = NewLedgerEntry::new(
            existing.product_id,
            input.amount,
            SourceKind::ManualInput,
            existing.id,
            actor_id,
        )?;

        // The entry may already have been reversed straight through the ledger
        let mut entries = if current.reversed {
            vec![replacement]
        } else {
            vec![current.reversal(actor_id)?, replacement]
        };
        // A correction is judged by its net effect: credits go in before debits
        entries.sort_by_key(|e| e.delta < Decimal::ZERO);
        let appended = append_entries(&mut tx, &mut book, &entries).await?;
        let ledger_entry_id = appended
            .iter()
            .find(|e| !e.is_reversal())
            .map(|e| e.id)
            .ok_or_else(|| AppError::Internal("ledger append returned no entry".to_string()))?;

        let note = input.note.or(existing.note);
        let row = sqlx::query_as::<_, InputRow>(&format!(
            r#"
            UPDATE stock_inputs
            SET amount = $1, note = $2, ledger_entry_id = $3, user_id = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING {INPUT_COLUMNS}
            "#
        ))
        .bind(input.amount)
        .bind(&note)
        .bind(ledger_entry_id)
        .bind(actor_id)
        .bind(input_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        StockInput::try_from(row)
    }

    /// Reverse an input's stock effect and hide it
    #[tracing::instrument(skip(self), fields(input_id = %input_id))]
    pub async fn delete(&self, actor_id: Uuid, input_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        let existing = self.lock_input(&mut tx, input_id).await?;

        let mut book =
            lock_products(&mut tx, &[existing.product_id], LockMode::IncludeDeleted).await?;
        let current = fetch_entry_for_update(&mut tx, existing.ledger_entry_id).await?;
        if !current.reversed {
            let reversal = current.reversal(actor_id)?;
            append_entries(&mut tx, &mut book, &[reversal]).await?;
        }

        sqlx::query("UPDATE stock_inputs SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(input_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    pub async fn get(&self, input_id: Uuid) -> AppResult<StockInput> {
        let row = sqlx::query_as::<_, InputRow>(&format!(
            "SELECT {INPUT_COLUMNS} FROM stock_inputs WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(input_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock input".to_string()))?;

        StockInput::try_from(row)
    }

    /// List inputs, newest first, optionally for one product
    pub async fn list(&self, product_id: Option<Uuid>) -> AppResult<Vec<StockInput>> {
        let rows = sqlx::query_as::<_, InputRow>(&format!(
            r#"
            SELECT {INPUT_COLUMNS}
            FROM stock_inputs
            WHERE NOT is_deleted AND ($1::uuid IS NULL OR product_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockInput::try_from).collect()
    }

    async fn lock_input(&self, conn: &mut PgConnection, input_id: Uuid) -> AppResult<StockInput> {
        let row = sqlx::query_as::<_, InputRow>(&format!(
            "SELECT {INPUT_COLUMNS} FROM stock_inputs WHERE id = $1 AND NOT is_deleted FOR UPDATE"
        ))
        .bind(input_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock input".to_string()))?;

        StockInput::try_from(row)
    }
}

async fn product_unit(conn: &mut PgConnection, product_id: Uuid) -> AppResult<Unit> {
    let unit = sqlx::query_scalar::<_, String>("SELECT unit FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;
    unit.parse::<Unit>().map_err(AppError::InvariantViolation)
}

fn check_amount(amount: Decimal, given: Unit, product_unit: Unit) -> AppResult<()> {
    if given != product_unit {
        return Err(AppError::Validation {
            field: "unit".to_string(),
            message: format!("Product is counted in {}, not {}", product_unit, given),
            message_id: format!("Produk dihitung dalam satuan {}, bukan {}", product_unit, given),
        });
    }
    validate_input_amount(amount, product_unit)
        .map_err(|msg| AppError::validation("amount", msg, "Jumlah tidak valid"))
}
