//! Custom Axum extractors.
//!
//! - [`Caller`]: the acting user, from trusted upstream headers
//!
//! Authentication happens upstream (gateway or session service). By the time
//! a request reaches this server, `X-User-Id` carries the verified user and
//! `X-Admin: true` marks a platform administrator.
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     Caller(actor): Caller,
//! ) -> Result<Json<Team>, AppError> {
//!     Ok(Json(state.engine.teams().lock(&actor, team_id).await?))
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use roundhouse_core::{Actor, UserId};

/// Header carrying the verified user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header marking a platform administrator.
pub const ADMIN_HEADER: &str = "X-Admin";

/// The acting user.
///
/// Rejects with 401 when `X-User-Id` is missing or not a UUID.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Self)
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {USER_ID_HEADER} header")))?
        .to_str()
        .map_err(|_| AppError::unauthorized(format!("Invalid {USER_ID_HEADER} header")))?;
    let user_id: UserId = raw
        .trim()
        .parse()
        .map_err(|_| AppError::unauthorized(format!("Invalid {USER_ID_HEADER} header")))?;

    let is_admin = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    Ok(Actor { user_id, is_admin })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(req: Request<()>) -> Result<Caller, AppError> {
        let (mut parts, ()) = req.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_caller_from_headers() {
        let user = UserId::new();
        let req = Request::builder()
            .header(USER_ID_HEADER, user.to_string())
            .body(())
            .expect("Valid request");

        let Caller(actor) = extract(req).await.expect("Should extract");

        assert_eq!(actor, Actor::user(user));
    }

    #[tokio::test]
    async fn test_admin_flag() {
        let user = UserId::new();
        let req = Request::builder()
            .header(USER_ID_HEADER, user.to_string())
            .header(ADMIN_HEADER, "TRUE")
            .body(())
            .expect("Valid request");

        let Caller(actor) = extract(req).await.expect("Should extract");

        assert_eq!(actor, Actor::admin(user));
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let req = Request::builder().body(()).expect("Valid request");

        let err = extract(req).await.expect_err("Should reject");

        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_user_is_unauthorized() {
        let req = Request::builder()
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(())
            .expect("Valid request");

        let err = extract(req).await.expect_err("Should reject");

        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
