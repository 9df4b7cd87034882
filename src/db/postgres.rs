//! Postgres backend: one sqlx transaction per unit of work.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};

use super::{Database, SessionFilter, SessionStore, UnitOfWork, UserFilter, UserStore};
use crate::error::AppError;
use crate::models::{NewSession, NewUser, Session, User};

/// Column list shared across session queries, aliased onto `Session` fields.
const SESSION_COLUMNS: &str = "id, user_id AS owner_id, refresh_token, \
                               fingerprint AS device_fingerprint, user_agent, \
                               ip AS origin_ip, expires_at, created_at";

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, role_id, created_at";

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceFault(format!("Migration failed: {}", e)))
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn push_session_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &SessionFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        builder.push(" AND id = ").push_bind(id);
    }
    if let Some(owner_id) = filter.owner_id {
        builder.push(" AND user_id = ").push_bind(owner_id);
    }
    if let Some(token) = &filter.refresh_token {
        builder.push(" AND refresh_token = ").push_bind(token.clone());
    }
    if let Some(epoch) = filter.expired_before {
        builder.push(" AND expires_at < ").push_bind(epoch);
    }
}

#[async_trait]
impl SessionStore for PgUnitOfWork {
    async fn create(&mut self, session: NewSession) -> Result<Session, AppError> {
        let query = format!(
            "INSERT INTO refresh_sessions (user_id, refresh_token, fingerprint, user_agent, ip, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {SESSION_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Session>(&query)
            .bind(session.owner_id)
            .bind(&session.refresh_token)
            .bind(&session.device_fingerprint)
            .bind(&session.user_agent)
            .bind(&session.origin_ip)
            .bind(session.expires_at)
            .bind(session.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(created)
    }

    /// Plain read, no row lock. Callers lock the owner before deleting, so
    /// a second redemption of one token waits there and then deletes nothing.
    async fn find_one(&mut self, filter: &SessionFilter) -> Result<Option<Session>, AppError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {SESSION_COLUMNS} FROM refresh_sessions"));
        push_session_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT 1");

        let session = builder
            .build_query_as::<Session>()
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(session)
    }

    async fn find_many(&mut self, filter: &SessionFilter) -> Result<Vec<Session>, AppError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {SESSION_COLUMNS} FROM refresh_sessions"));
        push_session_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at ASC, id ASC");

        let sessions = builder
            .build_query_as::<Session>()
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(sessions)
    }

    async fn delete(&mut self, session: &Session) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE id = $1")
            .bind(session.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&mut self, filter: &SessionFilter) -> Result<u64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM refresh_sessions");
        push_session_filter(&mut builder, filter);

        let result = builder.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn lock_owner(&mut self, owner_id: i32) -> Result<(), AppError> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(owner_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUnitOfWork {
    async fn create_user(&mut self, user: NewUser) -> Result<User, AppError> {
        let query = format!(
            "INSERT INTO users (email, first_name, last_name, password_hash, role_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.role_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                let duplicate = matches!(
                    &e,
                    sqlx::Error::Database(db_err) if db_err.is_unique_violation()
                );
                if duplicate {
                    AppError::UserAlreadyExists
                } else {
                    AppError::from(e)
                }
            })
    }

    async fn find_user(&mut self, filter: &UserFilter) -> Result<Option<User>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        if let Some(id) = filter.id {
            builder.push(" AND id = ").push_bind(id);
        }
        if let Some(email) = &filter.email {
            builder.push(" AND email = ").push_bind(email.clone());
        }
        builder.push(" LIMIT 1");

        let user = builder
            .build_query_as::<User>()
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let uow = *self;
        uow.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        let uow = *self;
        uow.tx.rollback().await?;
        Ok(())
    }
}
