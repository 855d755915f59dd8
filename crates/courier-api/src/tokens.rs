use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use courier_types::api::Claims;
use courier_types::models::{Role, TokenKind};

/// Sign a new token of the given kind for a user.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    role: Role,
    kind: TokenKind,
    ttl: Duration,
) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        kind,
        jti: Uuid::new_v4(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify signature and expiry, and check the token is of the expected kind.
/// Revocation is checked by the caller.
pub fn decode_token(secret: &str, token: &str, expected: TokenKind) -> Option<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    (data.claims.kind == expected).then_some(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_not_interchangeable() {
        let id = Uuid::new_v4();
        let refresh = issue_token("s", id, "alice", Role::User, TokenKind::Refresh, Duration::hours(1)).unwrap();

        assert!(decode_token("s", &refresh, TokenKind::Access).is_none());
        let claims = decode_token("s", &refresh, TokenKind::Refresh).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn wrong_secret_or_expired_is_rejected() {
        let id = Uuid::new_v4();
        let token = issue_token("s", id, "alice", Role::Admin, TokenKind::Access, Duration::hours(1)).unwrap();
        assert!(decode_token("other", &token, TokenKind::Access).is_none());

        // Well past the default 60s leeway
        let expired = issue_token("s", id, "alice", Role::User, TokenKind::Access, Duration::minutes(-10)).unwrap();
        assert!(decode_token("s", &expired, TokenKind::Access).is_none());
    }
}
