use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Basic email format validation.
///
/// Exactly one `@`, non-empty local part without spaces, and a domain with at
/// least one inner dot. Not RFC 5322.
pub fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(AppError::BadRequest(msg::EMAIL_EMPTY.into()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    let (local_part, domain_part) = (parts[0], parts[1]);

    if local_part.is_empty() || local_part.contains(' ') {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    if domain_part.is_empty()
        || !domain_part.contains('.')
        || domain_part.starts_with('.')
        || domain_part.ends_with('.')
    {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL_FORMAT.into()));
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(msg::PASSWORD_TOO_SHORT.into()));
    }
    Ok(())
}

/// Authorization level of an identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Superadmin,
}

impl UserRole {
    /// Admin-gated operations accept `admin` and `superadmin`.
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Superadmin)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Registration payload. Role is never taken from the client.
#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl CreateUser {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::BadRequest(msg::USERNAME_EMPTY.into()));
        }
        validate_email_format(&self.email)?;
        validate_password(&self.password)
    }
}

/// Full replacement of the editable profile fields (username, email, password).
#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl UpdateUser {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::BadRequest(msg::USERNAME_EMPTY.into()));
        }
        validate_email_format(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePassword {
    pub fn validate(&self) -> Result<()> {
        validate_password(&self.new_password)
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub new_role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub access_token: String,
    pub token_type: &'static str,
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("superadmin".parse::<UserRole>().unwrap(), UserRole::Superadmin);
        assert!("root".parse::<UserRole>().is_err());
        assert_eq!(UserRole::Superadmin.as_ref(), "superadmin");
    }

    #[test]
    fn test_is_admin() {
        assert!(!UserRole::User.is_admin());
        assert!(UserRole::Admin.is_admin());
        assert!(UserRole::Superadmin.is_admin());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email_format("ana@example.com").is_ok());
        assert!(validate_email_format("ana@example").is_err());
        assert!(validate_email_format("a b@example.com").is_err());
        assert!(validate_email_format("@example.com").is_err());
        assert!(validate_email_format("ana@@example.com").is_err());
        assert!(validate_email_format("ana@.com").is_err());
    }

    #[test]
    fn test_password_never_serialized() {
        let user = User {
            id: 1,
            username: "ana".into(),
            email: "ana@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: UserRole::User,
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"user\""));
    }
}
