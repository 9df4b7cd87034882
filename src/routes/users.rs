use crate::{
    auth::AuthenticatedUserId,
    db::{self, UserFilter},
    error::AppError,
    models::UserInfo,
    state::AppState,
};
use actix_web::{get, web, HttpResponse, Responder};

/// Returns the profile of the user the access token was issued to.
///
/// ## Responses:
/// - `200 OK`: `UserInfo` of the caller.
/// - `401 Unauthorized`: no bearer token.
/// - `404 Not Found`: the account was removed after the token was issued.
#[get("/me")]
pub async fn me(
    state: web::Data<AppState>,
    user_id: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let mut uow = state.db.begin().await?;
    let result = uow.find_user(&UserFilter::new().id(user_id.0)).await;
    let user = db::complete(uow, result)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok(HttpResponse::Ok().json(UserInfo::from(user)))
}
