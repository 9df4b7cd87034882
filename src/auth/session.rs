//! Login, rotation and revocation of refresh sessions.
//!
//! Every operation runs against a store handed in by the caller, normally a
//! unit of work, and never commits on its own. The caller decides the outcome
//! with [`crate::db::complete`].

use chrono::{Duration, Utc};

use crate::auth::password::verify_credentials;
use crate::auth::token::{TokenCodec, TokenPair};
use crate::config::JwtSettings;
use crate::db::{SessionStore, UserFilter, UserStore};
use crate::error::AppError;
use crate::models::NewSession;

/// Where a request comes from. Bound to every session it creates.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceContext {
    pub fingerprint: String,
    pub user_agent: String,
    pub ip: String,
}

#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(codec: TokenCodec, settings: &JwtSettings) -> Self {
        Self {
            codec,
            access_ttl: Duration::minutes(settings.access_token_expire_minutes),
            refresh_ttl: Duration::minutes(settings.refresh_token_expire_minutes),
            max_sessions: settings.max_sessions.max(1),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Checks email and password, then opens a session for the account.
    ///
    /// An unknown email and a wrong password both yield `InvalidCredentials`.
    pub async fn login<S>(
        &self,
        store: &mut S,
        email: &str,
        password: &str,
        device: &DeviceContext,
    ) -> Result<TokenPair, AppError>
    where
        S: SessionStore + UserStore + ?Sized,
    {
        let user = store.find_user(&UserFilter::new().email(email)).await?;
        let stored_hash = user.as_ref().map(|user| user.password_hash.as_str());

        if !verify_credentials(password, stored_hash)? {
            log::debug!("Rejected login attempt");
            return Err(AppError::InvalidCredentials);
        }

        match user {
            Some(user) => self.issue_and_persist(store, user.id, device).await,
            None => Err(AppError::InvalidCredentials),
        }
    }

    /// Issues a fresh pair and records its refresh half, evicting the owner's
    /// oldest sessions first so the cap holds once the new row exists.
    pub async fn issue_and_persist<S>(
        &self,
        store: &mut S,
        owner_id: i32,
        device: &DeviceContext,
    ) -> Result<TokenPair, AppError>
    where
        S: SessionStore + ?Sized,
    {
        let pair = self
            .codec
            .issue_pair(&owner_id.to_string(), self.access_ttl, self.refresh_ttl)?;

        store.delete_oldest_excess(owner_id, self.max_sessions).await?;

        let session = store
            .create(NewSession {
                owner_id,
                refresh_token: pair.refresh.token.clone(),
                device_fingerprint: device.fingerprint.clone(),
                user_agent: device.user_agent.clone(),
                origin_ip: device.ip.clone(),
                expires_at: pair.refresh.expires_at,
                created_at: Utc::now(),
            })
            .await?;
        log::debug!("Created session {} for user {}", session.id, owner_id);

        Ok(pair)
    }

    /// Redeems a refresh token for a new pair.
    ///
    /// The token is verified before it is used as a lookup key. A session
    /// presented with a foreign fingerprint is deleted and the call fails with
    /// `FingerprintMismatch`; the deletion must be committed by the caller.
    ///
    /// The owner is locked before the session row is touched, the same order
    /// `issue_and_persist` uses.
    pub async fn refresh<S>(
        &self,
        store: &mut S,
        refresh_token: &str,
        device: &DeviceContext,
    ) -> Result<TokenPair, AppError>
    where
        S: SessionStore + ?Sized,
    {
        self.codec.verify(refresh_token)?;

        let session = store
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(AppError::SessionNotFound)?;
        store.lock_owner(session.owner_id).await?;

        // A concurrent redemption that got the lock first leaves nothing to delete.
        if !store.delete(&session).await? {
            return Err(AppError::SessionNotFound);
        }

        if session.device_fingerprint != device.fingerprint {
            log::warn!(
                "Refresh with mismatched fingerprint, revoked session {} of user {}",
                session.id,
                session.owner_id
            );
            return Err(AppError::FingerprintMismatch);
        }

        self.issue_and_persist(store, session.owner_id, device).await
    }

    /// Ends the session behind `refresh_token`, or every session of its owner.
    ///
    /// Unknown tokens are ignored.
    pub async fn logout<S>(
        &self,
        store: &mut S,
        refresh_token: &str,
        delete_all: bool,
    ) -> Result<(), AppError>
    where
        S: SessionStore + ?Sized,
    {
        let session = match store.find_by_refresh_token(refresh_token).await? {
            Some(session) => session,
            None => {
                log::debug!("Logout with unknown refresh token");
                return Ok(());
            }
        };
        store.lock_owner(session.owner_id).await?;

        if delete_all {
            let removed = store.delete_by_owner(session.owner_id).await?;
            log::info!("Signed out user {} from {} session(s)", session.owner_id, removed);
        } else {
            store.delete(&session).await?;
            log::debug!("Signed out session {} of user {}", session.id, session.owner_id);
        }
        Ok(())
    }
}
