#![allow(dead_code)]

use std::sync::Arc;

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App};
use jsonwebtoken::Algorithm;

use taskflow::auth::{hash_password, DeviceContext, SessionManager, TokenCodec};
use taskflow::config::{CookieSettings, JwtSettings};
use taskflow::db::{Database, MemoryDatabase};
use taskflow::models::{NewUser, DEFAULT_ROLE_ID};
use taskflow::routes::{self, health};
use taskflow::AppState;

pub const PRIVATE_PEM: &str = include_str!("../fixtures/jwt-private.pem");
pub const PUBLIC_PEM: &str = include_str!("../fixtures/jwt-public.pem");

pub fn codec() -> TokenCodec {
    TokenCodec::new(Algorithm::RS256, PRIVATE_PEM.as_bytes(), PUBLIC_PEM.as_bytes()).unwrap()
}

pub fn jwt_settings(max_sessions: usize) -> JwtSettings {
    JwtSettings {
        private_key_path: "tests/fixtures/jwt-private.pem".into(),
        public_key_path: "tests/fixtures/jwt-public.pem".into(),
        algorithm: "RS256".into(),
        access_token_expire_minutes: 15,
        refresh_token_expire_minutes: 60,
        max_sessions,
    }
}

pub fn manager(max_sessions: usize) -> SessionManager {
    SessionManager::new(codec(), &jwt_settings(max_sessions))
}

pub fn device(fingerprint: &str) -> DeviceContext {
    DeviceContext {
        fingerprint: fingerprint.into(),
        user_agent: "integration-tests".into(),
        ip: "127.0.0.1".into(),
    }
}

pub fn state(db: MemoryDatabase, max_sessions: usize) -> web::Data<AppState> {
    web::Data::new(AppState::new(
        Arc::new(db),
        manager(max_sessions),
        CookieSettings {
            domain: None,
            secure: true,
        },
    ))
}

/// Stores a user directly, bypassing the HTTP layer.
pub async fn seed_user(db: &MemoryDatabase, email: &str, password: &str) -> i32 {
    let mut uow = db.begin().await.unwrap();
    let user = uow
        .create_user(NewUser {
            email: email.into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            password_hash: hash_password(password).unwrap(),
            role_id: DEFAULT_ROLE_ID,
        })
        .await
        .unwrap();
    uow.commit().await.unwrap();
    user.id
}

/// The service as mounted by the binary: `/health` plus everything under `/api`.
pub async fn init_app(
    state: web::Data<AppState>,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error> {
    test::init_service(
        App::new()
            .app_data(state)
            .service(health::health)
            .service(web::scope("/api").configure(routes::config)),
    )
    .await
}
