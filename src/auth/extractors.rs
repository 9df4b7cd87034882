use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::token::Claims;
use crate::auth::REFRESH_COOKIE;
use crate::error::AppError;

/// Device details every login and refresh must carry.
///
/// Fails with `MissingUserAgent` when the header is absent, empty or not
/// visible ASCII. The client IP is the TCP peer address, or `"unknown"`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_agent: String,
    pub client_ip: String,
}

impl AuthContext {
    pub fn from_http_request(req: &HttpRequest) -> Result<Self, AppError> {
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::MissingUserAgent)?;

        let client_ip = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            user_agent: user_agent.to_string(),
            client_ip,
        })
    }
}

impl FromRequest for AuthContext {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_http_request(req).map_err(Into::into))
    }
}

/// The refresh token presented in the `refresh_token` cookie.
#[derive(Debug, Clone)]
pub struct RefreshTokenCookie(pub String);

impl FromRequest for RefreshTokenCookie {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = req
            .cookie(REFRESH_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty());

        match token {
            Some(token) => ready(Ok(RefreshTokenCookie(token))),
            None => ready(Err(AppError::MissingRefreshToken.into())),
        }
    }
}

/// Extracts the authenticated user's ID from request extensions.
///
/// This extractor is intended to be used on routes protected by `AuthMiddleware`,
/// which verifies the access token and stores its `Claims` in the request
/// extensions. A subject that is not a numeric id is a malformed token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUserId(pub i32);

impl FromRequest for AuthenticatedUserId {
    type Error = ActixError; // AppError will be converted into ActixError via ResponseError
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let subject = req.extensions().get::<Claims>().map(|claims| claims.sub.clone());

        let result = match subject {
            Some(sub) => sub
                .parse::<i32>()
                .map(AuthenticatedUserId)
                .map_err(|_| AppError::TokenMalformed),
            None => Err(AppError::Unauthorized(
                "Access token claims not found in request".to_string(),
            )),
        };
        ready(result.map_err(Into::into))
    }
}
