//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the application.
//! Client-input faults (bad credentials, rejected tokens, missing headers) map to 4xx
//! responses with short, enumeration-resistant messages. Server faults (persistence,
//! key material) map to a generic 500 and are logged with full context instead of
//! being echoed to the client.
//!
//! `AppError` implements `actix_web::error::ResponseError` to seamlessly convert
//! application errors into appropriate HTTP responses with JSON bodies.
//! It also provides `From` trait implementations for `sqlx::Error`,
//! `validator::ValidationErrors`, `jsonwebtoken::errors::Error` and `bcrypt::BcryptError`,
//! allowing for easy conversion using the `?` operator.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use jsonwebtoken::errors::ErrorKind;
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Represents all possible errors that can occur within the application.
#[derive(Debug)]
pub enum AppError {
    /// Email/password pair did not match a stored account (HTTP 400).
    /// Deliberately does not say which half was wrong.
    InvalidCredentials,
    /// A token's `exp` claim has passed (HTTP 400).
    TokenExpired,
    /// A token failed signature or structure checks (HTTP 400).
    TokenMalformed,
    /// No session row matches the presented refresh token (HTTP 403).
    /// Usually the token was already redeemed or its session was evicted.
    SessionNotFound,
    /// The presented device fingerprint differs from the one bound to the session (HTTP 401).
    FingerprintMismatch,
    /// The request carried no usable `User-Agent` header (HTTP 400).
    MissingUserAgent,
    /// The request carried no refresh token cookie (HTTP 400).
    MissingRefreshToken,
    /// Registration attempted with an email that is already taken (HTTP 409).
    UserAlreadyExists,
    /// The authenticated principal no longer exists (HTTP 404).
    UserNotFound,
    /// Authentication is required but missing (HTTP 401).
    Unauthorized(String),
    /// Represents an error due to failed input validation (HTTP 422 Unprocessable Entity).
    /// Wraps errors from the `validator` crate.
    ValidationError(String),
    /// Key material or signing configuration problem (HTTP 500).
    Signing(String),
    /// Password hashing or a corrupt stored hash (HTTP 500).
    Hashing(String),
    /// Represents an error originating from the persistence layer (HTTP 500).
    PersistenceFault(String),
}

impl AppError {
    /// Whether the fault lies with the server rather than the client input.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            AppError::Signing(_) | AppError::Hashing(_) | AppError::PersistenceFault(_)
        )
    }

    /// Whether the failing unit of work must still be committed.
    ///
    /// A fingerprint mismatch deletes the session before failing, and that
    /// revocation has to survive the error.
    pub fn commits_revocation(&self) -> bool {
        matches!(self, AppError::FingerprintMismatch)
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidCredentials => "incorrect login or password".into(),
            AppError::TokenExpired => "token has expired".into(),
            AppError::TokenMalformed => "invalid token".into(),
            AppError::SessionNotFound => "refresh token is blocked".into(),
            AppError::FingerprintMismatch => "invalid fingerprint".into(),
            AppError::MissingUserAgent => "User-Agent header is missing".into(),
            AppError::MissingRefreshToken => "refresh token is missing".into(),
            AppError::UserAlreadyExists => "user with this email already exists".into(),
            AppError::UserNotFound => "user not found".into(),
            AppError::Unauthorized(msg) | AppError::ValidationError(msg) => msg.clone(),
            AppError::Signing(_) | AppError::Hashing(_) | AppError::PersistenceFault(_) => {
                "internal server error".into()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            AppError::Signing(msg) => write!(f, "Signing Error: {}", msg),
            AppError::Hashing(msg) => write!(f, "Hashing Error: {}", msg),
            AppError::PersistenceFault(msg) => write!(f, "Persistence Fault: {}", msg),
            other => f.write_str(&other.client_message()),
        }
    }
}

/// Converts `AppError` variants into `HttpResponse` objects.
///
/// Server faults are logged here, once, with their full detail; the client only
/// ever sees the generic message.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::TokenExpired
            | AppError::TokenMalformed
            | AppError::MissingUserAgent
            | AppError::MissingRefreshToken => StatusCode::BAD_REQUEST,
            AppError::FingerprintMismatch | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::SessionNotFound => StatusCode::FORBIDDEN,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::UserAlreadyExists => StatusCode::CONFLICT,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Signing(_) | AppError::Hashing(_) | AppError::PersistenceFault(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_fault() {
            log::error!("{}", self);
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.client_message()
        }))
    }
}

/// Converts `sqlx::Error` into `AppError::PersistenceFault`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match &error {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::PersistenceFault(format!("unique constraint violated: {}", db_err))
            }
            _ => AppError::PersistenceFault(error.to_string()),
        }
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Converts `jsonwebtoken::errors::Error` into the token error kinds.
///
/// Expiry is kept distinct from every other decode failure.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        match error.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::TokenMalformed,
        }
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::Hashing`.
///
/// bcrypt only fails on a corrupt stored hash or an invalid cost, both server-side problems.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::Hashing(error.to_string())
    }
}
