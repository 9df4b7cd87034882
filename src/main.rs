use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use chrono::Utc;

use taskflow::auth::{SessionManager, TokenCodec};
use taskflow::config::Config;
use taskflow::db::{self, Database, PgDatabase, SessionFilter};
use taskflow::routes::{self, health};
use taskflow::{AppError, AppState};

fn startup_error(error: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error.to_string())
}

/// Deletes sessions whose refresh token has already expired.
async fn sweep_expired_sessions(database: &dyn Database) -> Result<u64, AppError> {
    let mut uow = database.begin().await?;
    let result = uow
        .delete_many(&SessionFilter::new().expired_before(Utc::now().timestamp()))
        .await;
    db::complete(uow, result).await
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(startup_error)?;

    let database = PgDatabase::connect(&config.database_url, config.database_max_connections)
        .await
        .map_err(startup_error)?;
    database.migrate().await.map_err(startup_error)?;

    let swept = sweep_expired_sessions(&database)
        .await
        .map_err(startup_error)?;
    log::info!("Removed {} expired session(s) at start-up", swept);

    let codec = TokenCodec::from_settings(&config.jwt).map_err(startup_error)?;
    log::info!(
        "Signing tokens with {:?}, at most {} session(s) per user",
        codec.algorithm(),
        config.jwt.max_sessions
    );

    let state = web::Data::new(AppState::new(
        Arc::new(database),
        SessionManager::new(codec, &config.jwt),
        config.cookie.clone(),
    ));

    log::info!("Starting TaskFlow server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(web::scope("/api").configure(routes::config))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
