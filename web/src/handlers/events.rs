//! Event endpoints.
//!
//! - `POST /api/events` - create an event; the caller becomes its organizer
//! - `GET /api/events/:id` - event details

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use roundhouse_core::{Event, EventId};
use roundhouse_runtime::NewEvent;

/// Create an event.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "X-User-Id: 550e8400-e29b-41d4-a716-446655440000" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Spring Hackathon",
///     "start_time": "2025-06-01T09:00:00Z",
///     "end_time": "2025-06-03T17:00:00Z",
///     "min_team_size": 2,
///     "max_team_size": 4,
///     "max_participants": 120
///   }'
/// ```
pub async fn create_event(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(request): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = state.engine.events().create_event(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Event details.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Event>, AppError> {
    Ok(Json(state.engine.events().get_event(event_id).await?))
}
