//! JWT authentication extractors.
//!
//! Tokens are issued by the platform's auth service and validated here
//! against the shared secret. `AuthUser` gates user routes; `AdminUser`
//! additionally requires the `role` claim to be `admin`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::error::AppError;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject — the user's UUID
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
    /// Platform role, e.g. "admin"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Authenticated user extracted from a Bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub claims: Claims,
}

/// Authenticated user whose token carries the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: Uuid,
}

/// Encode a JWT token for a user.
pub fn encode_jwt(
    user_id: Uuid,
    role: Option<&str>,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
        role: role.map(|r| r.to_string()),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))?;

    Ok(token)
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

fn bearer_claims(parts: &Parts, secret: &str) -> Result<(Uuid, Claims), AppError> {
    let token = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("Missing or invalid Authorization header".to_string()))?;

    let claims = decode_jwt(token, secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;

    Ok((user_id, claims))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = bearer_claims(parts, &state.config.jwt_secret);
        async move {
            let (user_id, claims) = result?;
            Ok(AuthUser { user_id, claims })
        }
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = bearer_claims(parts, &state.config.jwt_secret);
        async move {
            let (user_id, claims) = result?;
            match claims.role.as_deref() {
                Some(role) if role.eq_ignore_ascii_case("admin") => Ok(AdminUser { user_id }),
                _ => Err(AppError::Auth("Admin role required".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-unit-tests";

    #[test]
    fn test_encode_decode_jwt() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, None, TEST_SECRET, 24).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert!(claims.exp > Utc::now().timestamp());
        assert!(claims.role.is_none());
    }

    #[test]
    fn test_role_claim_round_trip() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, Some("admin"), TEST_SECRET, 24).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, None, TEST_SECRET, 24).unwrap();
        let result = decode_jwt(&token, "wrong-secret");
        assert!(result.is_err());
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let user_id = Uuid::new_v4();
        // Create a token that expired 1 hour ago
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
            role: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let result = decode_jwt(&token, TEST_SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let result = decode_jwt("not.a.valid.jwt", TEST_SECRET);
        assert!(result.is_err());
    }
}
