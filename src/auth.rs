//! Bearer-token issuance and verification.

use crate::error::{AuthError, Result};
use anyhow::Context as _;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Token lifetime.
const TOKEN_TTL_HOURS: i64 = 24;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub platform: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    api_key: String,
}

impl AuthService {
    pub fn new(jwt_secret: &str, api_key: String) -> Self {
        Self {
            encoding: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt_secret.as_bytes()),
            api_key,
        }
    }

    /// Issue a token for a caller identity.
    pub fn create_access_token(&self, user_id: &str, platform: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .with_context(|| "failed to sign access token")
            .map_err(Into::into)
    }

    /// Exchange the configured API key for a platform-scoped token.
    pub fn exchange_api_key(&self, platform: &str, api_key: &str) -> Result<String> {
        if api_key != self.api_key {
            return Err(AuthError::InvalidCredentials.into());
        }
        self.create_access_token(&format!("api-user-{platform}"), platform)
    }

    /// Validate a bearer token and return its claims.
    pub fn verify_token(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new("test-secret", "test-api-key".into())
    }

    #[test]
    fn issued_tokens_verify_round_trip() {
        let auth = service();
        let token = auth.create_access_token("u1", "test").expect("token");
        let claims = auth.verify_token(&token).expect("claims");

        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.platform, "test");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tokens_signed_with_another_secret_fail() {
        let token = AuthService::new("other-secret", "k".into())
            .create_access_token("u1", "test")
            .expect("token");

        assert!(matches!(
            service().verify_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_tokens_fail() {
        assert!(matches!(
            service().verify_token("not-a-token"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn api_key_exchange_checks_the_key() {
        let auth = service();
        let token = auth.exchange_api_key("test", "test-api-key").expect("token");
        let claims = auth.verify_token(&token).expect("claims");
        assert_eq!(claims.user_id, "api-user-test");

        assert!(auth.exchange_api_key("test", "wrong").is_err());
    }
}
