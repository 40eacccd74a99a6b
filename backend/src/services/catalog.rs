//! Product catalog service
//!
//! Owns product identity, scan codes and prices. Stock is never written
//! here; it is read back as the ledger left it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    normalize_scan_code, validate_name, validate_price, validate_scan_code, Product, Unit,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Product service for managing the catalog
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Row for product queries
#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    unique_code: String,
    name: String,
    unit: String,
    buy_price: Decimal,
    sell_price: Decimal,
    stock: Decimal,
    image: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let unit = row
            .unit
            .parse::<Unit>()
            .map_err(AppError::InvariantViolation)?;
        Ok(Product {
            id: row.id,
            unique_code: row.unique_code,
            name: row.name,
            unit,
            buy_price: row.buy_price,
            sell_price: row.sell_price,
            stock: row.stock,
            image: row.image,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, unique_code, name, unit, buy_price, sell_price, stock, image, is_deleted, created_at, updated_at";

/// Input for creating a product. Stock always starts at zero.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 64))]
    pub unique_code: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub unit: Unit,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub image: Option<String>,
}

/// Input for updating a product
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 64))]
    pub unique_code: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub unit: Option<Unit>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    pub image: Option<String>,
}

/// How a product was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Referenced by history; hidden but kept
    Soft,
    /// Never used; removed outright
    Hard,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDeletion {
    pub id: Uuid,
    pub mode: DeleteMode,
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a product
    #[tracing::instrument(skip(self, input), fields(unique_code = %input.unique_code))]
    pub async fn create(&self, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        let unique_code = checked_code(&input.unique_code)?;
        checked_name(&input.name)?;
        checked_price("buy_price", input.buy_price)?;
        checked_price("sell_price", input.sell_price)?;

        // The partial unique index turns a racing duplicate into DuplicateCode as well
        self.ensure_code_free(&unique_code, None).await?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (unique_code, name, unit, buy_price, sell_price, image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&unique_code)
        .bind(input.name.trim())
        .bind(input.unit.as_str())
        .bind(input.buy_price)
        .bind(input.sell_price)
        .bind(&input.image)
        .fetch_one(&self.db)
        .await
        .map_err(|err| duplicate_of(err.into(), &unique_code))?;

        let product = Product::try_from(row)?;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Update a product's code, name, unit or prices
    #[tracing::instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update(&self, product_id: Uuid, input: UpdateProductInput) -> AppResult<Product> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        // Lock so a unit change cannot race a stock change
        let existing = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND NOT is_deleted FOR UPDATE"
        ))
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        let existing = Product::try_from(existing)?;

        let unique_code = match input.unique_code {
            Some(ref code) => {
                let code = checked_code(code)?;
                if code != existing.unique_code {
                    self.ensure_code_free(&code, Some(product_id)).await?;
                }
                code
            }
            None => existing.unique_code,
        };

        let name = match input.name {
            Some(name) => {
                checked_name(&name)?;
                name.trim().to_string()
            }
            None => existing.name,
        };

        let unit = input.unit.unwrap_or(existing.unit);
        if !existing.stock.is_zero() && !unit.accepts(existing.stock) {
            return Err(AppError::validation(
                "unit",
                "Current stock is fractional and cannot be counted in this unit",
                "Stok saat ini pecahan dan tidak bisa memakai satuan ini",
            ));
        }

        let buy_price = input.buy_price.unwrap_or(existing.buy_price);
        let sell_price = input.sell_price.unwrap_or(existing.sell_price);
        checked_price("buy_price", buy_price)?;
        checked_price("sell_price", sell_price)?;
        let image = input.image.or(existing.image);

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET unique_code = $1, name = $2, unit = $3, buy_price = $4, sell_price = $5,
                image = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&unique_code)
        .bind(&name)
        .bind(unit.as_str())
        .bind(buy_price)
        .bind(sell_price)
        .bind(&image)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| duplicate_of(err.into(), &unique_code))?;
        tx.commit().await?;

        Product::try_from(row)
    }

    /// Get an active product
    pub async fn get(&self, product_id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        Product::try_from(row)
    }

    /// List active products, optionally filtered by name or code
    pub async fn list(&self, search: Option<&str>) -> AppResult<Vec<Product>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE NOT is_deleted
              AND ($1::text IS NULL OR name ILIKE $1 OR unique_code ILIKE $1)
            ORDER BY name ASC
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Delete a product: hidden if any history refers to it, removed otherwise
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete(&self, product_id: Uuid) -> AppResult<ProductDeletion> {
        let mut tx = self.db.begin().await?;
        let found = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM products WHERE id = $1 AND NOT is_deleted FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;
        if found.is_none() {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let referenced = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM stock_ledger_entries WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM order_items WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM stock_inputs WHERE product_id = $1)
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let mode = if referenced {
            sqlx::query("UPDATE products SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            DeleteMode::Soft
        } else {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            DeleteMode::Hard
        };
        tx.commit().await?;

        tracing::info!(mode = ?mode, "Product deleted");
        Ok(ProductDeletion {
            id: product_id,
            mode,
        })
    }

    /// Reject a code already carried by another active product
    async fn ensure_code_free(&self, unique_code: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM products
                WHERE unique_code = $1 AND NOT is_deleted
                  AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(unique_code)
        .bind(except)
        .fetch_one(&self.db)
        .await?;

        if taken {
            tracing::warn!(unique_code, "Scan code already in use");
            return Err(AppError::DuplicateCode(unique_code.to_string()));
        }
        Ok(())
    }
}

/// Name the code a unique-index violation was raised for
fn duplicate_of(err: AppError, unique_code: &str) -> AppError {
    match err {
        AppError::DuplicateCode(_) => {
            tracing::warn!(unique_code, "Scan code taken by a concurrent write");
            AppError::DuplicateCode(unique_code.to_string())
        }
        other => other,
    }
}

fn checked_code(raw: &str) -> AppResult<String> {
    let code = normalize_scan_code(raw);
    validate_scan_code(&code).map_err(|msg| {
        AppError::validation("unique_code", msg, "Kode produk tidak valid")
    })?;
    Ok(code)
}

fn checked_name(name: &str) -> AppResult<()> {
    validate_name(name).map_err(|msg| AppError::validation("name", msg, "Nama tidak valid"))
}

fn checked_price(field: &str, price: Decimal) -> AppResult<()> {
    validate_price(price).map_err(|msg| AppError::validation(field, msg, "Harga tidak valid"))
}
