//! Authentication middleware
//!
//! JWT bearer authentication and role-based capability checks

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{Capability, Role};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::UserService;
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Check if the user's role grants a capability
    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    /// Permission guard for handlers
    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = %self.role,
                capability = capability.as_str(),
                "Permission denied"
            );
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication middleware that validates JWT tokens and checks the
/// account behind them is still active
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized("Missing or invalid Authorization header").into_response();
    };

    match load_user(&state, token).await {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Verify a token, then take the role from the account as it is now.
async fn load_user(state: &AppState, token: &str) -> AppResult<AuthUser> {
    let claimed = authenticate(token, &state.config.jwt.secret)?;
    let role = UserService::new(state.db.clone(), &state.config.jwt)
        .active_role(claimed.user_id)
        .await
        .map_err(|err| {
            if matches!(err, AppError::Unauthorized { .. }) {
                tracing::warn!(user_id = %claimed.user_id, "Token for inactive account");
            }
            err
        })?;

    Ok(AuthUser {
        user_id: claimed.user_id,
        role,
    })
}

/// Sign an access token naming `user_id` and `role`
pub fn issue_token(user_id: Uuid, role: Role, secret: &str, expiry_secs: i64) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        exp: (now + Duration::seconds(expiry_secs)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Decode a bearer token into the user it names
pub fn authenticate(token: &str, secret: &str) -> AppResult<AuthUser> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })?;

    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| unauthorized("Invalid user ID in token"))?;
    let role = claims
        .role
        .parse::<Role>()
        .map_err(|_| unauthorized("Invalid role in token"))?;

    Ok(AuthUser { user_id, role })
}

fn unauthorized(message: &str) -> AppError {
    AppError::Unauthorized {
        message: message.to_string(),
        message_id: "Tidak diizinkan".to_string(),
    }
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authentication required".to_string(),
                message_id: "Silakan masuk terlebih dahulu".to_string(),
            })
    }
}
