use std::sync::Arc;

use crate::auth::SessionManager;
use crate::config::CookieSettings;
use crate::db::Database;

/// Shared application state, registered once as `web::Data<AppState>`.
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub sessions: SessionManager,
    pub cookie: CookieSettings,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, sessions: SessionManager, cookie: CookieSettings) -> Self {
        Self {
            db,
            sessions,
            cookie,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::TokenCodec;
    use crate::config::JwtSettings;
    use crate::db::MemoryDatabase;
    use jsonwebtoken::Algorithm;

    const PRIVATE_PEM: &str = include_str!("../tests/fixtures/jwt-private.pem");
    const PUBLIC_PEM: &str = include_str!("../tests/fixtures/jwt-public.pem");

    pub(crate) fn test_state(max_sessions: usize) -> AppState {
        let codec =
            TokenCodec::new(Algorithm::RS256, PRIVATE_PEM.as_bytes(), PUBLIC_PEM.as_bytes())
                .unwrap();
        let settings = JwtSettings {
            private_key_path: "unused".into(),
            public_key_path: "unused".into(),
            algorithm: "RS256".into(),
            access_token_expire_minutes: 15,
            refresh_token_expire_minutes: 60,
            max_sessions,
        };
        AppState::new(
            Arc::new(MemoryDatabase::new()),
            SessionManager::new(codec, &settings),
            CookieSettings {
                domain: None,
                secure: false,
            },
        )
    }
}
