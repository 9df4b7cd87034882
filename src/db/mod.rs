//! Persistence seams consumed by the session engine.
//!
//! Every request runs inside one [`UnitOfWork`]: a single transaction that is
//! both a [`SessionStore`] and a [`UserStore`]. Nothing is visible to other
//! requests until [`UnitOfWork::commit`]; dropping a unit of work rolls it back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{NewSession, NewUser, Session, User};

pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;

/// Typed row filter for [`SessionStore`] queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    pub id: Option<i64>,
    pub owner_id: Option<i32>,
    pub refresh_token: Option<String>,
    /// Matches sessions whose `expires_at` lies strictly before this epoch.
    pub expired_before: Option<i64>,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn owner(mut self, owner_id: i32) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn expired_before(mut self, epoch_seconds: i64) -> Self {
        self.expired_before = Some(epoch_seconds);
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        self.id.map_or(true, |id| session.id == id)
            && self.owner_id.map_or(true, |owner| session.owner_id == owner)
            && self
                .refresh_token
                .as_deref()
                .map_or(true, |token| session.refresh_token == token)
            && self
                .expired_before
                .map_or(true, |epoch| session.is_expired_at(epoch))
    }
}

/// Typed row filter for [`UserStore`] queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub id: Option<i32>,
    pub email: Option<String>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: i32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn matches(&self, user: &User) -> bool {
        self.id.map_or(true, |id| user.id == id)
            && self
                .email
                .as_deref()
                .map_or(true, |email| user.email == email)
    }
}

/// Refresh-session rows, scoped to the enclosing transaction.
///
/// Lock order: the owner (through [`SessionStore::lock_owner`]) before any of
/// its session rows are deleted or inserted. Lookups take no locks.
#[async_trait]
pub trait SessionStore: Send {
    /// Inserts a session. A duplicate refresh token is a `PersistenceFault`.
    async fn create(&mut self, session: NewSession) -> Result<Session, AppError>;

    /// Newest matching row (`created_at` then `id`, both descending).
    async fn find_one(&mut self, filter: &SessionFilter) -> Result<Option<Session>, AppError>;

    /// All matching rows, oldest first (`created_at` then `id`, both ascending).
    async fn find_many(&mut self, filter: &SessionFilter) -> Result<Vec<Session>, AppError>;

    /// Deletes one row. Returns `false` if it was already gone.
    async fn delete(&mut self, session: &Session) -> Result<bool, AppError>;

    /// Deletes every matching row and returns how many went.
    async fn delete_many(&mut self, filter: &SessionFilter) -> Result<u64, AppError>;

    /// Serialises session creation for `owner_id` until the transaction ends.
    async fn lock_owner(&mut self, owner_id: i32) -> Result<(), AppError>;

    /// Exact-match lookup. Should duplicates ever exist, the newest one wins.
    async fn find_by_refresh_token(&mut self, token: &str) -> Result<Option<Session>, AppError> {
        self.find_one(&SessionFilter::new().refresh_token(token)).await
    }

    async fn delete_by_owner(&mut self, owner_id: i32) -> Result<u64, AppError> {
        self.delete_many(&SessionFilter::new().owner(owner_id)).await
    }

    /// Makes room for one more session under a cap of `max_sessions`.
    ///
    /// Keeps the newest `max_sessions - 1` rows of `owner_id` and deletes the
    /// rest, oldest first. Returns whether anything was evicted.
    async fn delete_oldest_excess(
        &mut self,
        owner_id: i32,
        max_sessions: usize,
    ) -> Result<bool, AppError> {
        self.lock_owner(owner_id).await?;

        let sessions = self.find_many(&SessionFilter::new().owner(owner_id)).await?;
        let keep = max_sessions.saturating_sub(1);
        if sessions.len() <= keep {
            return Ok(false);
        }

        let excess = sessions.len() - keep;
        for session in &sessions[..excess] {
            self.delete(session).await?;
        }
        log::info!(
            "Evicted {} oldest session(s) of user {} (cap {})",
            excess,
            owner_id,
            max_sessions
        );
        Ok(true)
    }
}

/// User rows, scoped to the enclosing transaction.
#[async_trait]
pub trait UserStore: Send {
    /// Inserts a user. A duplicate email is `UserAlreadyExists`.
    async fn create_user(&mut self, user: NewUser) -> Result<User, AppError>;

    async fn find_user(&mut self, filter: &UserFilter) -> Result<Option<User>, AppError>;
}

/// One transaction over every store.
#[async_trait]
pub trait UnitOfWork: SessionStore + UserStore {
    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Source of units of work.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

/// Ends a unit of work according to the outcome of the operation run in it.
///
/// Success commits. Failure rolls back, except for failures that carry a
/// revocation (see [`AppError::commits_revocation`]), which commit and still
/// return the error.
pub async fn complete<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(error) if error.commits_revocation() => {
            uow.commit().await?;
            Err(error)
        }
        Err(error) => {
            log::debug!("Rolling back unit of work: {}", error);
            if let Err(rollback_error) = uow.rollback().await {
                log::error!("Rollback failed: {}", rollback_error);
            }
            Err(error)
        }
    }
}
