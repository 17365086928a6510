use thiserror::Error;

/// Issuer stamped on every access token and required on verification.
pub const TOKEN_ISSUER: &str = "cursos";

/// Lifetime of every access token. Not configurable.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 55 * 60;

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessClaims {
    /// Id of the user the token was issued to (`sub`).
    pub user_id: i64,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl AccessClaims {
    pub fn ttl_secs(&self) -> i64 {
        self.expires_at - self.issued_at
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),
}
