//! # Sessions and Accounts
//!
//! HS256 bearer tokens, argon2 password hashing, and the `MaybeSession`
//! extractor. Handlers pass `Option<Session>` straight into the core, which
//! decides whether a session is required.

use crate::handlers::ApiResult;
use crate::state::AppState;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shop_core::{Role, Session, ShopError, ShopResult, User};
use std::convert::Infallible;
use tracing::{debug, info, instrument};

/// Session lifetime
pub const TOKEN_TTL_HOURS: i64 = 24;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: uuid::Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys for session tokens
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a bearer token for a user
    pub fn issue(&self, user: &User) -> ShopResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ShopError::Internal(format!("Failed to sign session token: {}", e)))
    }

    /// Verify a bearer token and return its session
    pub fn verify(&self, token: &str) -> ShopResult<Session> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "Rejected session token");
            ShopError::Unauthenticated
        })?;
        Ok(Session::new(data.claims.sub, data.claims.role))
    }
}

/// Hash a password with argon2id and a random salt
pub fn hash_password(password: &str) -> ShopResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ShopError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC hash string
pub fn verify_password(hash: &str, password: &str) -> ShopResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ShopError::Internal(format!("Invalid stored password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ShopError::Internal(format!("Password verification failed: {}", e))),
    }
}

/// The request's session, if a valid bearer token was sent.
///
/// Missing, malformed and expired tokens all yield `None`.
#[derive(Debug, Clone, Copy)]
pub struct MaybeSession(pub Option<Session>);

impl MaybeSession {
    pub fn session(&self) -> Option<&Session> {
        self.0.as_ref()
    }
}

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.auth.verify(token.trim()).ok());

        Ok(MaybeSession(session))
    }
}

/// Require an admin session
pub fn require_admin(session: Option<&Session>) -> ShopResult<&Session> {
    let session = shop_core::require_session(session)?;
    if !session.is_admin() {
        return Err(ShopError::Forbidden("Admin role required".to_string()));
    }
    Ok(session)
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize, validator::Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, validator::Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

impl AuthResponse {
    fn new(token: String, user: User) -> Self {
        Self {
            token,
            token_type: "Bearer",
            expires_in: TOKEN_TTL_HOURS * 3600,
            user,
        }
    }
}

#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    crate::handlers::validate(&request)?;

    let email = request.email.trim().to_lowercase();
    let user = User::new(request.name.trim(), email).with_password_hash(hash_password(&request.password)?);
    let user = state.stores.users.create_user(user).await?;
    info!(user_id = %user.id, "Account registered");

    let token = state.auth.issue(&user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse::new(token, user))))
}

#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    crate::handlers::validate(&request)?;

    let user = state
        .stores
        .users
        .find_by_email(request.email.trim())
        .await?
        .ok_or(ShopError::Unauthenticated)?;

    // Identity-provider accounts have no password and cannot log in here
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(ShopError::Unauthenticated.into());
    };
    if !verify_password(hash, &request.password)? {
        return Err(ShopError::Unauthenticated.into());
    }

    let token = state.auth.issue(&user)?;
    Ok(Json(AuthResponse::new(token, user)))
}
