use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Extractor that verifies the bearer token on any route. Construct
/// `AuthUser` for user-or-admin routes, `AdminUser` for admin-only routes;
/// both produce the same 401 on a missing/invalid/expired token, and
/// `AdminUser` additionally produces 403 when the role check fails.
pub struct AuthUser {
    pub username: String,
    pub is_admin: bool,
}

pub struct AdminUser(pub AuthUser);

fn extract_bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts).ok_or(AppError::Auth)?;
        let claims = state.token_authority.verify(token).map_err(|_| AppError::Auth)?;
        Ok(AuthUser {
            username: claims.user,
            is_admin: claims.is_admin,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
