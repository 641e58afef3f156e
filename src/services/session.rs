//! Session token service for backend-authenticated user scope.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::AuthConfig;
use crate::error::{AppError, Result};
use crate::models::SessionClaims;

pub const SESSION_TOKEN_TYPE: &str = "spc_session";

#[derive(Clone)]
pub struct SessionTokenService {
    jwt_secret: String,
    algorithm: Algorithm,
    expiration_hours: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedSessionToken {
    pub token: String,
    pub expires_at: i64,
}

impl SessionTokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let algorithm = match config.jwt_algorithm.to_uppercase().as_str() {
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            _ => Algorithm::HS256,
        };
        Self {
            jwt_secret: config.jwt_secret.clone(),
            algorithm,
            expiration_hours: config.jwt_expiration_hours.max(1),
        }
    }

    /// Mint a signed session token for API authentication.
    pub fn create_session_token(
        &self,
        user_id: &str,
        email: Option<&str>,
        expires_hours: Option<i64>,
    ) -> Result<IssuedSessionToken> {
        let now = Utc::now();
        let ttl_hours = expires_hours.unwrap_or(self.expiration_hours).max(1);
        let expires_at = now + Duration::hours(ttl_hours);
        let claims = SessionClaims {
            sub: user_id.to_string(),
            token_type: SESSION_TOKEN_TYPE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            email: email.map(|e| e.to_string()),
        };

        let token = encode(
            &Header::new(self.algorithm),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(IssuedSessionToken {
            token,
            expires_at: expires_at.timestamp(),
        })
    }

    /// Decode and validate a session token. Rejects wrong token type and
    /// missing subject in addition to signature/expiry failures.
    pub fn decode_session_token(&self, token: &str) -> Result<SessionClaims> {
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(self.algorithm),
        )?;

        let claims = data.claims;
        if claims.token_type != SESSION_TOKEN_TYPE {
            return Err(AppError::Unauthenticated(
                "Invalid session token type.".to_string(),
            ));
        }
        if claims.sub.trim().is_empty() {
            return Err(AppError::Unauthenticated(
                "Session token missing subject.".to_string(),
            ));
        }
        Ok(claims)
    }
}

/// Return the authenticated user id and reject cross-user attempts. The
/// core never trusts a client-supplied user_id.
pub fn ensure_user_scope(auth_user_id: &str, supplied_user_id: Option<&str>) -> Result<String> {
    if let Some(supplied) = supplied_user_id {
        let supplied = supplied.trim();
        if !supplied.is_empty() && supplied != auth_user_id {
            return Err(AppError::Forbidden(
                "user_id does not match authenticated session.".to_string(),
            ));
        }
    }
    Ok(auth_user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn service() -> SessionTokenService {
        SessionTokenService::new(&AuthConfig {
            jwt_secret: "unit_test_secret_that_is_long_enough".to_string(),
            jwt_algorithm: "HS256".to_string(),
            jwt_expiration_hours: 24,
            encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
        })
    }

    #[test]
    fn round_trips_session_claims() {
        let svc = service();
        let issued = svc
            .create_session_token("user-1", Some("u@example.com"), None)
            .unwrap();
        let claims = svc.decode_session_token(&issued.token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.token_type, SESSION_TOKEN_TYPE);
        assert_eq!(claims.email.as_deref(), Some("u@example.com"));
    }

    #[test]
    fn rejects_wrong_token_type() {
        let svc = service();
        let now = Utc::now();
        let claims = SessionClaims {
            sub: "user-1".to_string(),
            token_type: "other".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
            email: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("unit_test_secret_that_is_long_enough".as_bytes()),
        )
        .unwrap();
        assert!(svc.decode_session_token(&token).is_err());
    }

    #[test]
    fn scope_guard_rejects_cross_user() {
        assert!(ensure_user_scope("a", Some("b")).is_err());
        assert_eq!(ensure_user_scope("a", Some("a")).unwrap(), "a");
        assert_eq!(ensure_user_scope("a", None).unwrap(), "a");
    }
}
