//! User account service: staff accounts, login and token issuing
//!
//! Every ledger entry names the account that caused it, so accounts are never
//! removed outright. Deleting one hides it, frees its email and stops its
//! tokens from being accepted.

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{validate_indonesian_phone, validate_name, Role, User};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::{BootstrapAdminConfig, JwtConfig};
use crate::error::{AppError, AppResult, USER_EMAIL_INDEX};
use crate::middleware::auth::issue_token;

/// User service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    country_code: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    role: String,
    image: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(AppError::InvariantViolation)?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            country_code: row.country_code,
            phone: row.phone,
            address: row.address,
            role,
            image: row.image,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Credentials row used by login
#[derive(Debug, FromRow)]
struct CredentialRow {
    id: Uuid,
    role: String,
    password_hash: String,
    is_deleted: bool,
}

const USER_COLUMNS: &str =
    "id, name, email, country_code, phone, address, role, image, is_deleted, created_at, updated_at";

/// Input for registering a staff account
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    // bcrypt ignores anything past 72 bytes
    #[validate(length(min = 8, max = 72))]
    pub password: String,
    pub role: Role,
    #[validate(length(max = 8))]
    pub country_code: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub image: Option<String>,
}

/// Input for editing a staff account; absent fields are kept
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 72))]
    pub password: Option<String>,
    pub role: Option<Role>,
    #[validate(length(max = 8))]
    pub country_code: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub image: Option<String>,
}

/// Issued on successful login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub role: Role,
    pub user: User,
}

impl UserService {
    /// Create a new UserService instance
    pub fn new(db: PgPool, jwt: &JwtConfig) -> Self {
        Self {
            db,
            jwt_secret: jwt.secret.clone(),
            access_token_expiry: jwt.access_token_expiry_secs,
        }
    }

    /// Register a staff account
    #[tracing::instrument(skip(self, input), fields(role = %input.role))]
    pub async fn register(&self, input: RegisterUserInput) -> AppResult<User> {
        input.validate()?;
        checked_name(&input.name)?;
        let email = normalize_email(&input.email);
        let phone = checked_phone(input.phone)?;

        self.ensure_email_free(&email, None).await?;
        let password_hash = hash_password(&input.password)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, country_code, phone, address, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(input.name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(input.role.as_str())
        .bind(&input.country_code)
        .bind(&phone)
        .bind(&input.address)
        .bind(&input.image)
        .fetch_one(&self.db)
        .await
        .map_err(|err| duplicate_email(err.into(), &email))?;

        let user = User::try_from(row)?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Authenticate with email and password
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        let email = normalize_email(email);
        // Prefer the active account when a removed one shared the email
        let credentials = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, role, password_hash, is_deleted
            FROM users
            WHERE email = $1
            ORDER BY is_deleted ASC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(invalid_credentials)?;

        if credentials.is_deleted {
            return Err(account_disabled());
        }

        let valid = verify(password, &credentials.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            tracing::warn!(user_id = %credentials.id, "Failed login");
            return Err(invalid_credentials());
        }

        let role = credentials
            .role
            .parse::<Role>()
            .map_err(AppError::InvariantViolation)?;
        let access_token = self.generate_token(credentials.id, role)?;
        let user = self.get(credentials.id).await?;

        Ok(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
            role,
            user,
        })
    }

    /// Get an active account
    pub async fn get(&self, user_id: Uuid) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        User::try_from(row)
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE NOT is_deleted ORDER BY name ASC"
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    /// Edit an account. An admin cannot take away their own admin role.
    #[tracing::instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn update(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        input: UpdateUserInput,
    ) -> AppResult<User> {
        input.validate()?;
        let existing = self.get(user_id).await?;

        if actor_id == user_id
            && existing.role == Role::Admin
            && input.role.is_some_and(|r| r != Role::Admin)
        {
            return Err(AppError::validation(
                "role",
                "You cannot remove your own admin role",
                "Anda tidak dapat mencabut peran admin milik sendiri",
            ));
        }

        let name = match input.name {
            Some(name) => {
                checked_name(&name)?;
                name.trim().to_string()
            }
            None => existing.name,
        };
        let email = match input.email {
            Some(ref raw) => {
                let email = normalize_email(raw);
                if email != existing.email {
                    self.ensure_email_free(&email, Some(user_id)).await?;
                }
                email
            }
            None => existing.email,
        };
        let phone = match input.phone {
            Some(phone) => checked_phone(Some(phone))?,
            None => existing.phone,
        };
        let password_hash = input.password.as_deref().map(hash_password).transpose()?;
        let role = input.role.unwrap_or(existing.role);

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET name = $1, email = $2, role = $3, country_code = $4, phone = $5,
                address = $6, image = $7,
                password_hash = COALESCE($8, password_hash),
                updated_at = NOW()
            WHERE id = $9 AND NOT is_deleted
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&name)
        .bind(&email)
        .bind(role.as_str())
        .bind(input.country_code.or(existing.country_code))
        .bind(&phone)
        .bind(input.address.or(existing.address))
        .bind(input.image.or(existing.image))
        .bind(&password_hash)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|err| duplicate_email(err.into(), &email))?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        User::try_from(row)
    }

    /// Soft delete; history keeps naming the account
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, actor_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if actor_id == user_id {
            return Err(AppError::validation(
                "id",
                "You cannot delete your own account",
                "Anda tidak dapat menghapus akun sendiri",
            ));
        }

        let result = sqlx::query(
            "UPDATE users SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_deleted",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        tracing::info!("User deleted");
        Ok(())
    }

    /// Current role of an account that may still act. Removed or unknown
    /// accounts are refused even while their tokens have not expired.
    pub async fn active_role(&self, user_id: Uuid) -> AppResult<Role> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM users WHERE id = $1 AND NOT is_deleted",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(account_disabled)?;

        role.parse::<Role>().map_err(AppError::InvariantViolation)
    }

    /// Create the configured admin unless an active admin already exists.
    pub async fn ensure_admin(&self, admin: &BootstrapAdminConfig) -> AppResult<Option<User>> {
        let has_admin = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = $1 AND NOT is_deleted)",
        )
        .bind(Role::Admin.as_str())
        .fetch_one(&self.db)
        .await?;
        if has_admin {
            return Ok(None);
        }

        let user = self
            .register(RegisterUserInput {
                name: admin.name.clone(),
                email: admin.email.clone(),
                password: admin.password.clone(),
                role: Role::Admin,
                country_code: None,
                phone: None,
                address: None,
                image: None,
            })
            .await?;
        tracing::warn!(user_id = %user.id, "Bootstrap admin created");
        Ok(Some(user))
    }

    /// Sign an access token for an account
    pub fn generate_token(&self, user_id: Uuid, role: Role) -> AppResult<String> {
        issue_token(user_id, role, &self.jwt_secret, self.access_token_expiry)
    }

    async fn ensure_email_free(&self, email: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE email = $1 AND NOT is_deleted
                  AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await?;

        if taken {
            return Err(AppError::DuplicateEmail(email.to_string()));
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn checked_name(name: &str) -> AppResult<()> {
    validate_name(name).map_err(|msg| AppError::validation("name", msg, "Nama tidak valid"))
}

fn checked_phone(phone: Option<String>) -> AppResult<Option<String>> {
    let phone = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    if let Some(ref phone) = phone {
        validate_indonesian_phone(phone).map_err(|msg| {
            AppError::validation("phone", msg, "Format nomor telepon tidak valid")
        })?;
    }
    Ok(phone)
}

/// Name the email a unique-index violation was raised for
fn duplicate_email(err: AppError, email: &str) -> AppError {
    match err {
        AppError::DuplicateEmail(ref index) if index == USER_EMAIL_INDEX => {
            AppError::DuplicateEmail(email.to_string())
        }
        other => other,
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized {
        message: "Invalid email or password".to_string(),
        message_id: "Email atau kata sandi salah".to_string(),
    }
}

fn account_disabled() -> AppError {
    AppError::Unauthorized {
        message: "Account is disabled".to_string(),
        message_id: "Akun telah dinonaktifkan".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Sari@Toko.ID "), "sari@toko.id");
    }

    #[test]
    fn test_blank_phone_is_dropped_and_bad_phone_rejected() {
        assert_eq!(checked_phone(Some("  ".into())).unwrap(), None);
        assert!(matches!(
            checked_phone(Some("12ab".into())),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hashed = hash_password("rahasia-123").unwrap();
        assert!(verify("rahasia-123", &hashed).unwrap());
        assert!(!verify("rahasia-124", &hashed).unwrap());
    }

    #[test]
    fn test_index_violation_reports_the_email() {
        let err = duplicate_email(
            AppError::DuplicateEmail(USER_EMAIL_INDEX.to_string()),
            "sari@toko.id",
        );
        assert!(matches!(err, AppError::DuplicateEmail(ref e) if e == "sari@toko.id"));
    }

    #[test]
    fn test_short_password_fails_validation() {
        let input = RegisterUserInput {
            name: "Sari".into(),
            email: "sari@toko.id".into(),
            password: "short".into(),
            role: Role::Pegawai,
            country_code: None,
            phone: None,
            address: None,
            image: None,
        };
        assert!(input.validate().is_err());
    }
}
