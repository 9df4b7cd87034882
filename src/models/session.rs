use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A persisted refresh session, one per outstanding refresh token.
///
/// Every field is written once at creation; a session is never updated, only
/// deleted (on rotation, logout, fingerprint mismatch or eviction).
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Session {
    pub id: i64,
    /// Identifier of the user owning the session.
    pub owner_id: i32,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub device_fingerprint: String,
    pub user_agent: String,
    pub origin_ip: String,
    /// Epoch seconds, mirrors the refresh token's `exp` claim.
    pub expires_at: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a session row. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub owner_id: i32,
    pub refresh_token: String,
    pub device_fingerprint: String,
    pub user_agent: String,
    pub origin_ip: String,
    pub expires_at: i64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn from_new(id: i64, new: NewSession) -> Self {
        Self {
            id,
            owner_id: new.owner_id,
            refresh_token: new.refresh_token,
            device_fingerprint: new.device_fingerprint,
            user_agent: new.user_agent,
            origin_ip: new.origin_ip,
            expires_at: new.expires_at,
            created_at: new.created_at,
        }
    }

    pub fn is_expired_at(&self, epoch_seconds: i64) -> bool {
        self.expires_at < epoch_seconds
    }
}
