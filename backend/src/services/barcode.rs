//! Scan code resolution

use shared::{normalize_scan_code, validate_scan_code, Product};
use sqlx::PgPool;

use super::catalog::{ProductRow, PRODUCT_COLUMNS};
use crate::error::{AppError, AppResult};

/// Maps a scanned code to the one active product carrying it
#[derive(Clone)]
pub struct BarcodeResolver {
    db: PgPool,
}

impl BarcodeResolver {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Resolve a scanned or typed code.
    ///
    /// Soft-deleted products never match, so a code freed by a deletion
    /// resolves to whichever active product carries it now.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, code: &str) -> AppResult<Product> {
        let code = normalize_scan_code(code);
        if validate_scan_code(&code).is_err() {
            return Err(AppError::NotFound(format!("Product with code {}", code)));
        }

        let mut rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE unique_code = $1 AND NOT is_deleted LIMIT 2"
        ))
        .bind(&code)
        .fetch_all(&self.db)
        .await?;

        if rows.len() > 1 {
            tracing::error!(code = %code, "Scan code matches more than one active product");
            return Err(AppError::InvariantViolation(format!(
                "scan code {} is carried by more than one active product",
                code
            )));
        }

        let row = rows
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Product with code {}", code)))?;
        Product::try_from(row)
    }
}
