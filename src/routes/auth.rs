use crate::{
    auth::{
        hash_password, AuthContext, DeviceContext, LoginRequest, LoginResponse, LogoutQuery,
        MessageResponse, RefreshRequest, RefreshTokenCookie, RegisterRequest, TokenPair,
        REFRESH_COOKIE,
    },
    db,
    error::AppError,
    models::{NewUser, DEFAULT_ROLE_ID},
    state::AppState,
};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{post, web, HttpResponse, Responder};
use validator::Validate;

/// Path the refresh cookie is scoped to; the browser sends it nowhere else.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

fn refresh_cookie(state: &AppState, value: String) -> Cookie<'static> {
    let mut builder = Cookie::build(REFRESH_COOKIE, value)
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(state.cookie.secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(
            state.sessions.refresh_ttl().num_seconds(),
        ));
    if let Some(domain) = &state.cookie.domain {
        builder = builder.domain(domain.clone());
    }
    builder.finish()
}

fn removal_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = refresh_cookie(state, String::new());
    cookie.make_removal();
    cookie
}

fn token_response(state: &AppState, message: &str, pair: &TokenPair) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(refresh_cookie(state, pair.refresh.token.clone()))
        .json(LoginResponse::bearer(message, pair))
}

/// Register a new user
///
/// ## Responses:
/// - `201 Created`: the account exists; no session is opened.
/// - `409 Conflict`: the email is already registered.
/// - `422 Unprocessable Entity`: the payload failed validation.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let register_data = register_data.into_inner();

    let password_hash = hash_password(&register_data.password)?;

    let mut uow = state.db.begin().await?;
    let result = uow
        .create_user(NewUser {
            email: register_data.email,
            first_name: register_data.first_name,
            last_name: register_data.last_name,
            password_hash,
            role_id: DEFAULT_ROLE_ID,
        })
        .await;
    let user = db::complete(uow, result).await?;
    log::info!("Registered user {}", user.id);

    Ok(HttpResponse::Created().json(MessageResponse::ok("registration completed")))
}

/// Login user
///
/// Verifies the credentials, opens a session bound to the presented
/// fingerprint and returns the access token. The refresh token is set as an
/// HTTP-only cookie.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    context: AuthContext,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;

    let device = DeviceContext {
        fingerprint: login_data.fingerprint.clone(),
        user_agent: context.user_agent,
        ip: context.client_ip,
    };

    let mut uow = state.db.begin().await?;
    let result = state
        .sessions
        .login(uow.as_mut(), &login_data.email, &login_data.password, &device)
        .await;
    let pair = db::complete(uow, result).await?;

    Ok(token_response(&state, "login successful", &pair))
}

/// Rotate the refresh token
///
/// Redeems the refresh cookie for a new pair. The old session is gone
/// afterwards whether or not the call succeeds with a matching fingerprint.
#[post("/refresh")]
pub async fn refresh(
    state: web::Data<AppState>,
    context: AuthContext,
    refresh_token: RefreshTokenCookie,
    refresh_data: web::Json<RefreshRequest>,
) -> Result<impl Responder, AppError> {
    refresh_data.validate()?;

    let device = DeviceContext {
        fingerprint: refresh_data.fingerprint.clone(),
        user_agent: context.user_agent,
        ip: context.client_ip,
    };

    let mut uow = state.db.begin().await?;
    let result = state
        .sessions
        .refresh(uow.as_mut(), &refresh_token.0, &device)
        .await;
    let pair = db::complete(uow, result).await?;

    Ok(token_response(&state, "tokens refreshed", &pair))
}

/// Logout
///
/// Ends the current session, or every session of the user with
/// `?all_sessions=true`, and clears the refresh cookie. Repeated calls succeed.
#[post("/logout")]
pub async fn logout(
    state: web::Data<AppState>,
    refresh_token: Option<RefreshTokenCookie>,
    query: web::Query<LogoutQuery>,
) -> Result<impl Responder, AppError> {
    if let Some(RefreshTokenCookie(token)) = refresh_token {
        let mut uow = state.db.begin().await?;
        let result = state
            .sessions
            .logout(uow.as_mut(), &token, query.all_sessions)
            .await;
        db::complete(uow, result).await?;
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(&state))
        .json(MessageResponse::ok("logged out")))
}
