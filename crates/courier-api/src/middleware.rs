use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::{Timelike, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use courier_types::models::{Role, TokenKind};

use crate::error::ApiError;
use crate::state::{AppState, with_db};
use crate::throttle::AccessWindow;
use crate::tokens::decode_token;

/// Paths subject to rate limiting and the access window.
const CHAT_PATHS: &[&str] = &["/api/conversations", "/api/messages"];

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    /// User id in the form stored by the database.
    pub fn db_id(&self) -> String {
        self.id.to_string()
    }
}

/// Validate the bearer access token and load the caller. The role comes from
/// the database so a demotion takes effect before the token expires.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode_token(&state.settings.jwt_secret, bearer.token(), TokenKind::Access)
        .ok_or(ApiError::Unauthorized)?;

    let uid = claims.sub.to_string();
    let row = with_db(&state, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let user = AuthUser {
        id: claims.sub,
        role: row.role.parse().unwrap_or_default(),
        username: row.username,
    };

    req.extensions_mut().insert(user.clone());
    let mut response = next.run(req).await;
    // Surfaced to the request logger, which sits outside this layer
    response.extensions_mut().insert(user);
    Ok(response)
}

/// Must run after `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = req
        .extensions()
        .get::<AuthUser>()
        .is_some_and(|u| u.role.is_admin());
    if !is_admin {
        return Err(ApiError::forbidden("Admin access required."));
    }
    Ok(next.run(req).await)
}

/// One event per request under `courier::requests`, with the caller and path.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let user = response
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.username.as_str())
        .unwrap_or("Anonymous");
    info!(
        target: "courier::requests",
        "User: {} - {} {} - {}",
        user,
        method,
        path,
        response.status().as_u16()
    );
    response
}

/// Limit POSTs to chat paths per client address.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if req.method() == Method::POST && is_chat_path(req.uri().path()) {
        let ip = client_ip(&req);
        if !state.rate_limiter.check(&ip) {
            warn!("Rate limit exceeded for {} on {}", ip, req.uri().path());
            return ApiError::TooManyRequests.into_response();
        }
    }
    next.run(req).await
}

/// Reject chat paths during the configured UTC hours.
pub async fn restrict_hours(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let restricted = state
        .settings
        .restricted_hours
        .is_some_and(|window| is_restricted(&window, req.uri().path(), Utc::now().hour()));
    if restricted {
        return ApiError::forbidden("Access to this endpoint is restricted during this time.")
            .into_response();
    }
    next.run(req).await
}

fn is_chat_path(path: &str) -> bool {
    CHAT_PATHS.iter().any(|p| path.starts_with(p))
}

fn is_restricted(window: &AccessWindow, path: &str, hour: u32) -> bool {
    is_chat_path(path) && window.contains(hour)
}

/// First `X-Forwarded-For` entry, else the peer address.
fn client_ip(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;

    #[test]
    fn only_chat_paths_are_restricted() {
        let window: AccessWindow = "6-21".parse().unwrap();
        assert!(is_restricted(&window, "/api/messages/", 12));
        assert!(is_restricted(&window, "/api/conversations/4/", 12));
        assert!(!is_restricted(&window, "/api/messages/", 22));
        assert!(!is_restricted(&window, "/api/token/", 12));
        assert!(!is_restricted(&window, "/api/unread/", 12));
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let req = http::Request::builder()
            .uri("/api/messages/")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "203.0.113.9");

        let mut req = http::Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000))));
        assert_eq!(client_ip(&req), "127.0.0.1");
    }
}
