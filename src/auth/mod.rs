pub mod extractors;
pub mod middleware;
pub mod password;
pub mod session;
pub mod token;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Re-export necessary items
pub use extractors::{AuthContext, AuthenticatedUserId, RefreshTokenCookie};
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use session::{DeviceContext, SessionManager};
pub use token::{Claims, TokenCodec, TokenPair};

/// Name of the cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

lazy_static! {
    // Letters (any script), spaces, apostrophes and hyphens
    static ref NAME_REGEX: regex::Regex = regex::Regex::new(r"^[\p{L} '\-]+$").unwrap();
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address for the new account.
    /// Must be a valid email format.
    #[validate(email)]
    pub email: String,
    #[validate(
        length(min = 2, max = 50),
        regex(
            path = "NAME_REGEX",
            message = "Name may contain only letters, spaces, apostrophes or hyphens"
        )
    )]
    pub first_name: String,
    #[validate(
        length(min = 2, max = 50),
        regex(
            path = "NAME_REGEX",
            message = "Name may contain only letters, spaces, apostrophes or hyphens"
        )
    )]
    pub last_name: String,
    /// Password for the new account.
    /// Must be between 8 and 50 characters long.
    #[validate(length(min = 8, max = 50))]
    pub password: String,
}

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub password: String,
    /// Opaque client-side device identifier the new session is bound to.
    #[validate(length(min = 1, max = 255))]
    pub fingerprint: String,
}

/// Body of `POST /auth/refresh`; the token itself comes from the cookie.
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 255))]
    pub fingerprint: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    #[serde(default)]
    pub all_sessions: bool,
}

/// Response after a successful login or refresh.
///
/// The refresh token travels only in the cookie, never in this body.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub message: String,
    pub access_token: String,
    pub token_type: String,
    /// Absolute expiry of the access token, in epoch seconds.
    pub expires_in: i64,
}

impl LoginResponse {
    pub fn bearer(message: &str, pair: &TokenPair) -> Self {
        Self {
            ok: true,
            message: message.to_string(),
            access_token: pair.access.token.clone(),
            token_type: "bearer".to_string(),
            expires_in: pair.access.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            ok: true,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn register(first_name: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: "alice@example.com".to_string(),
            first_name: first_name.to_string(),
            last_name: "O'Neil-Smith".to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_login_request_validation() {
        let valid_login = LoginRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
            fingerprint: "fp-1".to_string(),
        };
        assert!(valid_login.validate().is_ok());

        let invalid_email_login = LoginRequest {
            email: "testexample.com".to_string(),
            password: "password123".to_string(),
            fingerprint: "fp-1".to_string(),
        };
        assert!(invalid_email_login.validate().is_err());

        let missing_fingerprint = LoginRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
            fingerprint: String::new(),
        };
        assert!(missing_fingerprint.validate().is_err());
    }

    #[test]
    fn test_register_request_validation() {
        assert!(register("Alice", "Passw0rd!").validate().is_ok());
        assert!(register("Zoë", "Passw0rd!").validate().is_ok());

        assert!(register("A", "Passw0rd!").validate().is_err());
        assert!(register("R2-D2", "Passw0rd!").validate().is_err());
        assert!(register("Alice", "short").validate().is_err());
        assert!(register("Alice", &"x".repeat(51)).validate().is_err());
    }

    #[test]
    fn test_logout_query_defaults_to_single_session() {
        let query: LogoutQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.all_sessions);
    }
}
