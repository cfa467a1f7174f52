//! Registration endpoints.
//!
//! - `GET /api/events/:id/registrations`
//! - `POST /api/events/:id/registrations` - register the caller, or the
//!   caller's locked team when `team_id` is given
//! - `GET /api/registrations/:id`
//! - `POST /api/registrations/:id/cancel` - owner or organizer
//! - `POST /api/registrations/:id/approve` | `/reject` | `/promote` - organizer

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use roundhouse_core::{EventId, Registration, RegistrationId, TeamId};
use roundhouse_runtime::Cancellation;
use serde::Deserialize;

/// Body of `POST /events/:id/registrations`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    /// Register this team instead of the caller alone
    pub team_id: Option<TeamId>,
}

/// Registrations of an event.
pub async fn list_registrations(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Vec<Registration>>, AppError> {
    Ok(Json(
        state.engine.capacity().list_registrations(event_id).await?,
    ))
}

/// Register for an event.
///
/// Returns one registration per admitted participant. A full event answers
/// 409 `CAPACITY_CONFLICT` unless it keeps a waitlist, in which case the
/// registrations come back `waitlisted`.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/$EVENT/registrations \
///   -H "X-User-Id: $USER" -H "Content-Type: application/json" -d '{}'
/// ```
pub async fn register(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(event_id): Path<EventId>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Vec<Registration>>), AppError> {
    let registrations = state
        .engine
        .capacity()
        .register(&actor, event_id, request.team_id)
        .await?;
    Ok((StatusCode::CREATED, Json(registrations)))
}

/// One registration.
pub async fn get_registration(
    State(state): State<AppState>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, AppError> {
    Ok(Json(
        state
            .engine
            .capacity()
            .get_registration(registration_id)
            .await?,
    ))
}

/// Cancel a registration and report the refund owed.
pub async fn cancel(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Cancellation>, AppError> {
    let cancellation = state
        .engine
        .capacity()
        .cancel_registration(&actor, registration_id)
        .await?;
    Ok(Json(cancellation))
}

/// Approve a pending registration.
pub async fn approve(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .engine
        .capacity()
        .approve_registration(&actor, registration_id)
        .await?;
    Ok(Json(registration))
}

/// Reject a pending registration.
pub async fn reject(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .engine
        .capacity()
        .reject_registration(&actor, registration_id)
        .await?;
    Ok(Json(registration))
}

/// Move a waitlisted registration into a free slot.
pub async fn promote(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .engine
        .capacity()
        .promote_waitlisted(&actor, registration_id)
        .await?;
    Ok(Json(registration))
}
