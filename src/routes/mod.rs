pub mod auth;
pub mod health;
pub mod users;

use actix_web::web;

use crate::auth::AuthMiddleware;

/// Mounts the API under the caller's scope (`/api` in the server).
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::register)
            .service(auth::login)
            .service(auth::refresh)
            .service(auth::logout),
    )
    .service(web::scope("/users").wrap(AuthMiddleware).service(users::me));
}
