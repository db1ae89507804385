use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tower_sessions::Session;

use crate::{AppState, auth, error::AppError};

pub const USER_ID: &str = "user_id";

/// Authenticated caller on the fallback channel: a bearer token when the
/// header is present, otherwise the session cookie. Both resolve through
/// the same identity tables as the websocket handshake.
pub struct CurrentUser(pub i64);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
            let raw = value.to_str().map_err(|_| AppError::Unauthenticated)?;
            let token = raw.strip_prefix("Bearer ").ok_or(AppError::Unauthenticated)?;
            let user = auth::resolve_token(&state.db_pool, token)
                .await?
                .ok_or(AppError::Unauthenticated)?;
            return Ok(CurrentUser(user.id));
        }

        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthenticated)?;
        let user_id = session
            .get::<i64>(USER_ID)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        Ok(CurrentUser(user_id))
    }
}
