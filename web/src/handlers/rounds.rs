//! Round endpoints.
//!
//! - `GET /api/events/:id/rounds` - rounds in number order
//! - `POST /api/events/:id/rounds` - append a round (organizer)
//! - `GET /api/events/:id/rounds/:number`
//! - `PATCH /api/events/:id/rounds/:number` - reschedule or change status (organizer)
//! - `DELETE /api/events/:id/rounds/:number` - delete the last round (organizer)
//! - `POST /api/events/:id/rounds/:number/advance` - advance from this round
//!   (`0` admits from the registration phase)

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use roundhouse_core::{EventId, Round};
use roundhouse_runtime::{AdvanceReport, NewRound, RoundChanges, Selection};

/// Rounds of an event.
pub async fn list_rounds(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Vec<Round>>, AppError> {
    Ok(Json(state.engine.rounds().list_rounds(event_id).await?))
}

/// Create the next round.
pub async fn create_round(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(event_id): Path<EventId>,
    Json(request): Json<NewRound>,
) -> Result<(StatusCode, Json<Round>), AppError> {
    let round = state
        .engine
        .rounds()
        .create_round(&actor, event_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(round)))
}

/// One round.
pub async fn get_round(
    State(state): State<AppState>,
    Path((event_id, number)): Path<(EventId, u32)>,
) -> Result<Json<Round>, AppError> {
    Ok(Json(state.engine.rounds().get_round(event_id, number).await?))
}

/// Partially update a round.
///
/// ```bash
/// curl -X PATCH http://localhost:8080/api/events/$EVENT/rounds/1 \
///   -H "X-User-Id: $ORGANIZER" -H "Content-Type: application/json" \
///   -d '{"status": "ongoing"}'
/// ```
pub async fn update_round(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((event_id, number)): Path<(EventId, u32)>,
    Json(changes): Json<RoundChanges>,
) -> Result<Json<Round>, AppError> {
    let round = state
        .engine
        .rounds()
        .update_round(&actor, event_id, number, changes)
        .await?;
    Ok(Json(round))
}

/// Delete the last round.
pub async fn delete_round(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((event_id, number)): Path<(EventId, u32)>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .rounds()
        .delete_round(&actor, event_id, number)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Advance the selected participants out of a round and eliminate the rest.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/$EVENT/rounds/1/advance \
///   -H "X-User-Id: $ORGANIZER" -H "Content-Type: application/json" \
///   -d '{"registrations": ["…"], "teams": ["…"]}'
/// ```
pub async fn advance(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((event_id, from_round)): Path<(EventId, u32)>,
    Json(selection): Json<Selection>,
) -> Result<Json<AdvanceReport>, AppError> {
    let report = state
        .engine
        .progression()
        .advance(&actor, event_id, from_round, selection)
        .await?;
    Ok(Json(report))
}
