//! In-memory backend with real transaction semantics.
//!
//! A unit of work holds the store's lock for its whole lifetime and mutates a
//! staged copy, so transactions are serialisable and a rollback (or a drop)
//! simply discards the copy.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Database, SessionFilter, SessionStore, UnitOfWork, UserFilter, UserStore};
use crate::error::AppError;
use crate::models::{NewSession, NewUser, Session, User};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    sessions: Vec<Session>,
    last_user_id: i32,
    last_session_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows verbatim, skipping every constraint check.
    pub async fn seed_sessions(&self, sessions: Vec<Session>) {
        let mut state = self.state.lock().await;
        for session in sessions {
            state.last_session_id = state.last_session_id.max(session.id);
            state.sessions.push(session);
        }
    }

    /// Committed sessions of one owner, oldest first.
    pub async fn sessions_of(&self, owner_id: i32) -> Vec<Session> {
        let state = self.state.lock().await;
        sorted_matches(&state.sessions, &SessionFilter::new().owner(owner_id))
    }
}

fn sorted_matches(sessions: &[Session], filter: &SessionFilter) -> Vec<Session> {
    let mut matched: Vec<Session> = sessions
        .iter()
        .filter(|session| filter.matches(session))
        .cloned()
        .collect();
    matched.sort_by_key(|session| (session.created_at, session.id));
    matched
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl SessionStore for MemoryUnitOfWork {
    async fn create(&mut self, session: NewSession) -> Result<Session, AppError> {
        if self
            .staged
            .sessions
            .iter()
            .any(|existing| existing.refresh_token == session.refresh_token)
        {
            return Err(AppError::PersistenceFault(
                "unique constraint violated: refresh_sessions.refresh_token".into(),
            ));
        }

        self.staged.last_session_id += 1;
        let created = Session::from_new(self.staged.last_session_id, session);
        self.staged.sessions.push(created.clone());
        Ok(created)
    }

    async fn find_one(&mut self, filter: &SessionFilter) -> Result<Option<Session>, AppError> {
        Ok(sorted_matches(&self.staged.sessions, filter).pop())
    }

    async fn find_many(&mut self, filter: &SessionFilter) -> Result<Vec<Session>, AppError> {
        Ok(sorted_matches(&self.staged.sessions, filter))
    }

    async fn delete(&mut self, session: &Session) -> Result<bool, AppError> {
        let before = self.staged.sessions.len();
        self.staged.sessions.retain(|existing| existing.id != session.id);
        Ok(self.staged.sessions.len() < before)
    }

    async fn delete_many(&mut self, filter: &SessionFilter) -> Result<u64, AppError> {
        let before = self.staged.sessions.len();
        self.staged.sessions.retain(|existing| !filter.matches(existing));
        Ok((before - self.staged.sessions.len()) as u64)
    }

    // The whole store is already locked by this unit of work.
    async fn lock_owner(&mut self, _owner_id: i32) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUnitOfWork {
    async fn create_user(&mut self, user: NewUser) -> Result<User, AppError> {
        if self.staged.users.iter().any(|existing| existing.email == user.email) {
            return Err(AppError::UserAlreadyExists);
        }

        self.staged.last_user_id += 1;
        let created = User::from_new(self.staged.last_user_id, user);
        self.staged.users.push(created.clone());
        Ok(created)
    }

    async fn find_user(&mut self, filter: &UserFilter) -> Result<Option<User>, AppError> {
        Ok(self
            .staged
            .users
            .iter()
            .find(|user| filter.matches(user))
            .cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    fn new_session(owner_id: i32, token: &str, created_at: DateTime<Utc>) -> NewSession {
        NewSession {
            owner_id,
            refresh_token: token.into(),
            device_fingerprint: "fp-1".into(),
            user_agent: "agent".into(),
            origin_ip: "127.0.0.1".into(),
            expires_at: created_at.timestamp() + 3600,
            created_at,
        }
    }

    fn ids(sessions: &[Session]) -> Vec<i64> {
        sessions.iter().map(|session| session.id).collect()
    }

    #[actix_rt::test]
    async fn test_commit_publishes_and_rollback_discards() {
        let db = MemoryDatabase::new();
        let now = Utc::now();

        let mut uow = db.begin().await.unwrap();
        uow.create(new_session(1, "kept", now)).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin().await.unwrap();
        uow.create(new_session(1, "discarded", now)).await.unwrap();
        uow.rollback().await.unwrap();

        {
            let mut uow = db.begin().await.unwrap();
            uow.create(new_session(1, "dropped", now)).await.unwrap();
        }

        let sessions = db.sessions_of(1).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].refresh_token, "kept");
    }

    #[actix_rt::test]
    async fn test_duplicate_refresh_token_is_a_persistence_fault() {
        let db = MemoryDatabase::new();
        let mut uow = db.begin().await.unwrap();
        uow.create(new_session(1, "same", Utc::now())).await.unwrap();

        let duplicate = uow.create(new_session(2, "same", Utc::now())).await;
        assert!(matches!(duplicate, Err(AppError::PersistenceFault(_))));
    }

    #[actix_rt::test]
    async fn test_duplicate_rows_resolve_to_newest() {
        let db = MemoryDatabase::new();
        let older = Utc::now() - Duration::minutes(5);
        let newer = Utc::now();
        db.seed_sessions(vec![
            Session::from_new(10, new_session(1, "dup", newer)),
            Session::from_new(11, new_session(2, "dup", older)),
            Session::from_new(12, new_session(3, "dup", newer)),
        ])
        .await;

        let mut uow = db.begin().await.unwrap();
        let found = uow.find_by_refresh_token("dup").await.unwrap().unwrap();
        assert_eq!(found.id, 12);
        assert_eq!(found.owner_id, 3);
    }

    #[actix_rt::test]
    async fn test_delete_oldest_excess_keeps_newest() {
        let db = MemoryDatabase::new();
        let base = Utc::now() - Duration::minutes(10);
        let mut uow = db.begin().await.unwrap();
        for minute in 0..4 {
            let token = format!("t{}", minute);
            uow.create(new_session(1, &token, base + Duration::minutes(minute)))
                .await
                .unwrap();
        }
        uow.create(new_session(2, "other-owner", base)).await.unwrap();

        assert!(uow.delete_oldest_excess(1, 3).await.unwrap());
        let remaining = uow.find_many(&SessionFilter::new().owner(1)).await.unwrap();
        assert_eq!(ids(&remaining), vec![3, 4]);

        assert!(!uow.delete_oldest_excess(1, 3).await.unwrap());
        assert_eq!(uow.find_many(&SessionFilter::new().owner(2)).await.unwrap().len(), 1);
    }

    #[actix_rt::test]
    async fn test_eviction_tie_break_is_id_ascending() {
        let db = MemoryDatabase::new();
        let same_instant = Utc::now();
        let mut uow = db.begin().await.unwrap();
        for n in 0..3 {
            uow.create(new_session(1, &format!("tie{}", n), same_instant))
                .await
                .unwrap();
        }

        assert!(uow.delete_oldest_excess(1, 2).await.unwrap());
        let remaining = uow.find_many(&SessionFilter::new().owner(1)).await.unwrap();
        assert_eq!(ids(&remaining), vec![3]);
    }

    #[actix_rt::test]
    async fn test_cap_of_one_clears_all_previous_sessions() {
        let db = MemoryDatabase::new();
        let mut uow = db.begin().await.unwrap();
        uow.create(new_session(1, "a", Utc::now())).await.unwrap();
        uow.create(new_session(1, "b", Utc::now())).await.unwrap();

        assert!(uow.delete_oldest_excess(1, 1).await.unwrap());
        assert!(uow.find_many(&SessionFilter::new().owner(1)).await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_delete_reports_missing_rows() {
        let db = MemoryDatabase::new();
        let mut uow = db.begin().await.unwrap();
        let session = uow.create(new_session(1, "x", Utc::now())).await.unwrap();

        assert!(uow.delete(&session).await.unwrap());
        assert!(!uow.delete(&session).await.unwrap());
        assert_eq!(uow.delete_by_owner(1).await.unwrap(), 0);
    }

    #[actix_rt::test]
    async fn test_expired_sweep() {
        let db = MemoryDatabase::new();
        let mut uow = db.begin().await.unwrap();
        let mut stale = new_session(1, "stale", Utc::now());
        stale.expires_at = 10;
        uow.create(stale).await.unwrap();
        uow.create(new_session(1, "fresh", Utc::now())).await.unwrap();

        let now = Utc::now().timestamp();
        assert_eq!(uow.delete_many(&SessionFilter::new().expired_before(now)).await.unwrap(), 1);
        assert_eq!(uow.find_many(&SessionFilter::new()).await.unwrap().len(), 1);
    }

    #[actix_rt::test]
    async fn test_duplicate_email_rejected() {
        let db = MemoryDatabase::new();
        let mut uow = db.begin().await.unwrap();
        let new_user = NewUser {
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            password_hash: "hash".into(),
            role_id: 1,
        };

        let user = uow.create_user(new_user.clone()).await.unwrap();
        assert_eq!(user.id, 1);
        assert!(matches!(
            uow.create_user(new_user).await,
            Err(AppError::UserAlreadyExists)
        ));

        let found = uow
            .find_user(&UserFilter::new().email("alice@example.com"))
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(1));
    }
}
