//! Staff account tests against Postgres
//!
//! Tests for:
//! - bootstrap admin, registration and login
//! - emails unique among active accounts
//! - removed accounts losing access while their tokens are unexpired
//! - admins unable to lock themselves out

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
};
use shared::{Role, User};
use sqlx::PgPool;
use supplymate_backend::config::{
    BootstrapAdminConfig, DatabaseConfig, JwtConfig, LedgerConfig, LoggingConfig,
    ReportingConfig, ServerConfig,
};
use supplymate_backend::error::AppError;
use supplymate_backend::middleware::auth::authenticate;
use supplymate_backend::services::user::{RegisterUserInput, UpdateUserInput};
use supplymate_backend::services::UserService;
use supplymate_backend::{create_app, AppState, Config};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn jwt() -> JwtConfig {
    JwtConfig {
        secret: SECRET.to_string(),
        access_token_expiry_secs: 3600,
    }
}

fn config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
        },
        jwt: jwt(),
        bootstrap_admin: None,
        ledger: LedgerConfig::default(),
        reporting: ReportingConfig::default(),
        logging: LoggingConfig {
            format: "pretty".to_string(),
        },
    }
}

fn admin_config() -> BootstrapAdminConfig {
    BootstrapAdminConfig {
        name: "Admin Toko".to_string(),
        email: "Admin@Toko.id".to_string(),
        password: "admin-password".to_string(),
    }
}

fn registration(email: &str, role: Role) -> RegisterUserInput {
    RegisterUserInput {
        name: "Sari".to_string(),
        email: email.to_string(),
        password: "rahasia-123".to_string(),
        role,
        country_code: Some("+62".to_string()),
        phone: Some("081234567890".to_string()),
        address: None,
        image: None,
    }
}

async fn bootstrap(service: &UserService) -> User {
    service.ensure_admin(&admin_config()).await.unwrap().unwrap()
}

async fn get(app: axum::Router, uri: &str, token: &str) -> StatusCode {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[sqlx::test(migrations = "./migrations")]
async fn test_bootstrap_admin_is_created_once(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let admin = bootstrap(&service).await;
    assert_eq!(admin.role, Role::Admin);
    assert_eq!(admin.email, "admin@toko.id");

    assert!(service.ensure_admin(&admin_config()).await.unwrap().is_none());
    assert_eq!(service.list().await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_register_then_login(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let user = service
        .register(registration("sari@toko.id", Role::Pegawai))
        .await
        .unwrap();
    assert_eq!(user.phone.as_deref(), Some("081234567890"));

    let login = service.login(" SARI@toko.id", "rahasia-123").await.unwrap();
    assert_eq!(login.role, Role::Pegawai);
    assert_eq!(login.user.id, user.id);
    assert_eq!(login.token_type, "Bearer");

    let claimed = authenticate(&login.access_token, SECRET).unwrap();
    assert_eq!(claimed.user_id, user.id);
    assert_eq!(claimed.role, Role::Pegawai);

    assert!(matches!(
        service.login("sari@toko.id", "salah-sandi").await,
        Err(AppError::Unauthorized { .. })
    ));
    assert!(matches!(
        service.login("nobody@toko.id", "rahasia-123").await,
        Err(AppError::Unauthorized { .. })
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_email_is_unique_among_active_accounts(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let admin = bootstrap(&service).await;
    let first = service
        .register(registration("budi@toko.id", Role::Manager))
        .await
        .unwrap();

    let duplicate = service
        .register(registration("Budi@Toko.id", Role::Pegawai))
        .await;
    assert!(matches!(duplicate, Err(AppError::DuplicateEmail(ref e)) if e == "budi@toko.id"));

    service.delete(admin.id, first.id).await.unwrap();
    let second = service
        .register(registration("budi@toko.id", Role::Pegawai))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);

    let login = service.login("budi@toko.id", "rahasia-123").await.unwrap();
    assert_eq!(login.user.id, second.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_update_changes_role_and_password(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let admin = bootstrap(&service).await;
    let user = service
        .register(registration("rina@toko.id", Role::Pegawai))
        .await
        .unwrap();

    let updated = service
        .update(
            admin.id,
            user.id,
            UpdateUserInput {
                role: Some(Role::Manager),
                password: Some("sandi-baru-456".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.role, Role::Manager);
    assert_eq!(updated.name, "Sari");
    assert_eq!(updated.phone.as_deref(), Some("081234567890"));

    assert!(service.login("rina@toko.id", "rahasia-123").await.is_err());
    let login = service.login("rina@toko.id", "sandi-baru-456").await.unwrap();
    assert_eq!(login.role, Role::Manager);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_admin_cannot_remove_own_access(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let admin = bootstrap(&service).await;

    assert!(matches!(
        service.delete(admin.id, admin.id).await,
        Err(AppError::Validation { .. })
    ));
    let demote = service
        .update(
            admin.id,
            admin.id,
            UpdateUserInput {
                role: Some(Role::Pegawai),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(demote, Err(AppError::Validation { .. })));
    assert_eq!(service.active_role(admin.id).await.unwrap(), Role::Admin);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_deleted_account_loses_access(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let admin = bootstrap(&service).await;
    let user = service
        .register(registration("dewi@toko.id", Role::Pegawai))
        .await
        .unwrap();
    let token = service.login("dewi@toko.id", "rahasia-123").await.unwrap().access_token;

    service.delete(admin.id, user.id).await.unwrap();

    assert!(matches!(
        service.active_role(user.id).await,
        Err(AppError::Unauthorized { .. })
    ));
    assert!(matches!(
        service.login("dewi@toko.id", "rahasia-123").await,
        Err(AppError::Unauthorized { .. })
    ));
    assert!(matches!(service.get(user.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        service.delete(admin.id, user.id).await,
        Err(AppError::NotFound(_))
    ));

    // The token itself is still valid; the router must refuse it anyway
    assert!(authenticate(&token, SECRET).is_ok());
    let app = create_app(AppState {
        db: pool.clone(),
        config: Arc::new(config()),
    });
    assert_eq!(
        get(app, "/api/v1/products", &token).await,
        StatusCode::UNAUTHORIZED
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_user_routes_are_admin_only(pool: PgPool) {
    let service = UserService::new(pool.clone(), &jwt());
    let admin = bootstrap(&service).await;
    service
        .register(registration("manajer@toko.id", Role::Manager))
        .await
        .unwrap();

    let admin_token = service.generate_token(admin.id, Role::Admin).unwrap();
    let manager_token = service
        .login("manajer@toko.id", "rahasia-123")
        .await
        .unwrap()
        .access_token;

    let app = create_app(AppState {
        db: pool.clone(),
        config: Arc::new(config()),
    });
    assert_eq!(get(app.clone(), "/api/v1/users", &admin_token).await, StatusCode::OK);
    assert_eq!(
        get(app.clone(), "/api/v1/users", &manager_token).await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        get(app, &format!("/api/v1/users/{}", admin.id), &admin_token).await,
        StatusCode::OK
    );
}
