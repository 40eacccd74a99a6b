//! Partner service

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{validate_indonesian_phone, validate_name, Partner};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PartnerService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct PartnerRow {
    id: Uuid,
    name: String,
    phone: Option<String>,
    address: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PartnerRow> for Partner {
    fn from(row: PartnerRow) -> Self {
        Partner {
            id: row.id,
            name: row.name,
            phone: row.phone,
            address: row.address,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PARTNER_COLUMNS: &str = "id, name, phone, address, is_deleted, created_at, updated_at";

/// Input for creating a partner
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePartnerInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

impl PartnerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, input: CreatePartnerInput) -> AppResult<Partner> {
        input.validate()?;
        validate_name(&input.name)
            .map_err(|msg| AppError::validation("name", msg, "Nama tidak valid"))?;

        let phone = input
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if let Some(ref phone) = phone {
            validate_indonesian_phone(phone).map_err(|msg| {
                AppError::validation("phone", msg, "Format nomor telepon tidak valid")
            })?;
        }

        let row = sqlx::query_as::<_, PartnerRow>(&format!(
            "INSERT INTO partners (name, phone, address) VALUES ($1, $2, $3) RETURNING {PARTNER_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&phone)
        .bind(&input.address)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(partner_id = %row.id, "Partner created");
        Ok(row.into())
    }

    /// Get an active partner
    pub async fn get(&self, partner_id: Uuid) -> AppResult<Partner> {
        sqlx::query_as::<_, PartnerRow>(&format!(
            "SELECT {PARTNER_COLUMNS} FROM partners WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(partner_id)
        .fetch_optional(&self.db)
        .await?
        .map(Partner::from)
        .ok_or_else(|| AppError::NotFound("Partner".to_string()))
    }

    pub async fn list(&self) -> AppResult<Vec<Partner>> {
        let rows = sqlx::query_as::<_, PartnerRow>(&format!(
            "SELECT {PARTNER_COLUMNS} FROM partners WHERE NOT is_deleted ORDER BY name ASC"
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Partner::from).collect())
    }

    /// Soft delete; existing orders keep pointing at the partner
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, partner_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE partners SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_deleted",
        )
        .bind(partner_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Partner".to_string()));
        }
        Ok(())
    }
}
