use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use courier_db::NewUser;
use courier_types::api::{
    LoginRequest, LogoutRequest, RefreshRequest, RefreshResponse, RegisterRequest, StatusMessage,
    TokenPairResponse,
};
use courier_types::models::{Role, TokenKind, User};

use crate::convert;
use crate::error::ApiError;
use crate::state::{AppState, with_db};
use crate::tokens::{decode_token, issue_token};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();

    // Validate input
    if username.chars().count() < 3 || username.chars().count() > 150 {
        return Err(ApiError::bad_request("Username must be between 3 and 150 characters."));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters."));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("Enter a valid email address."));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4();
    let row = with_db(&state, move |db| {
        if db.get_user_by_username(&username)?.is_some() {
            return Ok(Err("A user with that username already exists."));
        }
        if db.get_user_by_email(&email)?.is_some() {
            return Ok(Err("A user with that email already exists."));
        }

        // A concurrent registration can still win between the checks and here
        let inserted = db.create_user(&NewUser {
            id: &user_id.to_string(),
            username: &username,
            email: &email,
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            password_hash: &password_hash,
            phone_number: req.phone_number.as_deref(),
            role: Role::User.as_str(),
        })?;
        if !inserted {
            return Ok(Err("A user with that username or email already exists."));
        }
        Ok(Ok(db.get_user_by_id(&user_id.to_string())?))
    })
    .await?
    .map_err(|msg| ApiError::Conflict(msg.into()))?
    .ok_or_else(|| anyhow::anyhow!("user {user_id} missing after insert"))?;

    let user = convert::user(row);
    info!("Registered user {} ({})", user.username, user.user_id);

    let (access, refresh) = token_pair(&state, &user)?;
    Ok((StatusCode::CREATED, Json(TokenPairResponse { access, refresh, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let row = with_db(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| anyhow::anyhow!("stored hash for {} is unreadable: {e}", row.id))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for {}", req.username);
            ApiError::Unauthorized
        })?;

    let user = convert::user(row);
    let (access, refresh) = token_pair(&state, &user)?;
    Ok(Json(TokenPairResponse { access, refresh, user }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = decode_token(&state.settings.jwt_secret, &req.refresh, TokenKind::Refresh)
        .ok_or(ApiError::Unauthorized)?;

    let jti = claims.jti.to_string();
    let uid = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        if db.is_token_revoked(&jti)? {
            return Ok(None);
        }
        db.get_user_by_id(&uid)
    })
    .await?
    .ok_or(ApiError::Unauthorized)?;

    let user = convert::user(row);
    let access = issue_token(
        &state.settings.jwt_secret,
        user.user_id,
        &user.username,
        user.role,
        TokenKind::Access,
        state.settings.access_ttl,
    )?;
    Ok(Json(RefreshResponse { access, user }))
}

/// Blacklist the given refresh token.
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = req
        .refresh
        .ok_or_else(|| ApiError::bad_request("Refresh token is required."))?;
    let claims = decode_token(&state.settings.jwt_secret, &token, TokenKind::Refresh)
        .ok_or_else(|| ApiError::bad_request("Invalid or expired token."))?;

    let jti = claims.jti.to_string();
    let uid = claims.sub.to_string();
    let exp = claims.exp as i64;
    with_db(&state, move |db| db.revoke_token(&jti, &uid, exp)).await?;

    info!("User {} logged out", claims.username);
    Ok((
        StatusCode::RESET_CONTENT,
        Json(StatusMessage::new("Successfully logged out.")),
    ))
}

fn token_pair(state: &AppState, user: &User) -> Result<(String, String), ApiError> {
    let s = &state.settings;
    let access = issue_token(&s.jwt_secret, user.user_id, &user.username, user.role, TokenKind::Access, s.access_ttl)?;
    let refresh = issue_token(&s.jwt_secret, user.user_id, &user.username, user.role, TokenKind::Refresh, s.refresh_ttl)?;
    Ok((access, refresh))
}
