use std::collections::HashSet;

use jwt_simple::JWTError;
use jwt_simple::prelude::*;

use super::{ACCESS_TOKEN_TTL_SECS, AccessClaims, TOKEN_ISSUER, TokenError};

/// Issues and verifies HS256 bearer tokens for users.
///
/// The subject is the decimal user id. Tokens live for
/// [`ACCESS_TOKEN_TTL_SECS`] and expiry is enforced with zero clock tolerance.
#[derive(Clone)]
pub struct TokenService {
    key: HS256Key,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: HS256Key::from_bytes(secret),
        }
    }

    /// Issue a token for `user_id` valid from now.
    pub fn issue(&self, user_id: i64) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        self.issue_at(user_id, now)
    }

    /// Issue a token as if it had been created at `issued_at` (unix seconds).
    pub fn issue_at(&self, user_id: i64, issued_at: i64) -> Result<String, TokenError> {
        let issued_at = u64::try_from(issued_at)
            .map_err(|_| TokenError::Invalid("issue time before epoch".into()))?;

        let mut claims = Claims::create(Duration::from_secs(ACCESS_TOKEN_TTL_SECS))
            .with_issuer(TOKEN_ISSUER)
            .with_subject(user_id.to_string());
        claims.issued_at = Some(Duration::from_secs(issued_at));
        claims.invalid_before = Some(Duration::from_secs(issued_at));
        claims.expires_at = Some(Duration::from_secs(issued_at + ACCESS_TOKEN_TTL_SECS));

        self.key
            .authenticate(claims)
            .map_err(|e| TokenError::Invalid(format!("failed to sign token: {}", e)))
    }

    /// Verify signature, issuer and expiry, then resolve the subject to a user id.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut allowed_issuers = HashSet::new();
        allowed_issuers.insert(TOKEN_ISSUER.to_string());

        let options = VerificationOptions {
            allowed_issuers: Some(allowed_issuers),
            time_tolerance: Some(Duration::from_secs(0)),
            ..Default::default()
        };

        let claims = self
            .key
            .verify_token::<NoCustomClaims>(token, Some(options))
            .map_err(|e| match e.downcast_ref::<JWTError>() {
                Some(JWTError::TokenHasExpired) => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?;

        let user_id = claims
            .subject
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| TokenError::Invalid("subject is not a user id".into()))?;

        let (Some(iat), Some(exp)) = (claims.issued_at, claims.expires_at) else {
            return Err(TokenError::Invalid("missing iat or exp".into()));
        };

        Ok(AccessClaims {
            user_id,
            issued_at: iat.as_secs() as i64,
            expires_at: exp.as_secs() as i64,
        })
    }
}
