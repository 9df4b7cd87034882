use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role assigned to freshly registered users.
pub const DEFAULT_ROLE_ID: i32 = 1;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user row; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role_id: i32,
}

/// Public view of a user returned by `/users/me`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role_id: i32,
}

impl User {
    pub fn from_new(id: i32, new: NewUser) -> Self {
        Self {
            id,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            role_id: new.role_id,
            created_at: Utc::now(),
        }
    }
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role_id: user.role_id,
        }
    }
}
