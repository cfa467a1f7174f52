//! Team endpoints.
//!
//! - `GET /api/events/:id/teams`
//! - `POST /api/events/:id/teams` - create a team led by the caller
//! - `POST /api/teams/join` - join with an invite code
//! - `GET /api/teams/:id`
//! - `GET /api/teams/by-code/:code`
//! - `POST /api/teams/:id/members` - leader adds a user
//! - `DELETE /api/teams/:id/members/:user_id` - leader removes a member, or a member leaves
//! - `POST /api/teams/:id/lock` | `/unlock` | `/disband` | `/invite-code`
//! - `POST /api/teams/:id/transfer` - hand leadership to another member
//! - `PUT /api/teams/:id/standing` - organizer records score and rank

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use roundhouse_core::{EventId, Team, TeamId, UserId};
use serde::Deserialize;

/// Body of `POST /events/:id/teams`.
#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    /// Team name
    pub name: String,
}

/// Body of `POST /teams/join`.
#[derive(Debug, Deserialize)]
pub struct JoinTeamRequest {
    /// Invite code (case-insensitive)
    pub invite_code: String,
}

/// Body of `POST /teams/:id/members`.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    /// User to add
    pub user_id: UserId,
}

/// Body of `POST /teams/:id/transfer`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Member who becomes leader
    pub new_leader_id: UserId,
}

/// Body of `PUT /teams/:id/standing`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StandingRequest {
    /// Score, if known
    pub score: Option<f64>,
    /// Rank, if known
    pub rank: Option<u32>,
}

/// Teams of an event.
pub async fn list_teams(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Vec<Team>>, AppError> {
    Ok(Json(state.engine.teams().list_teams(event_id).await?))
}

/// Create a team.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/$EVENT/teams \
///   -H "X-User-Id: $USER" -H "Content-Type: application/json" \
///   -d '{"name": "Night Owls"}'
/// ```
pub async fn create_team(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(event_id): Path<EventId>,
    Json(request): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), AppError> {
    let team = state
        .engine
        .teams()
        .create_team(&actor, event_id, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

/// Join a team by invite code.
pub async fn join_team(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(request): Json<JoinTeamRequest>,
) -> Result<Json<Team>, AppError> {
    let team = state
        .engine
        .teams()
        .join_with_code(&actor, &request.invite_code)
        .await?;
    Ok(Json(team))
}

/// One team.
pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
) -> Result<Json<Team>, AppError> {
    Ok(Json(state.engine.teams().get_team(team_id).await?))
}

/// Look a team up by invite code.
pub async fn find_by_invite_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Team>, AppError> {
    Ok(Json(state.engine.teams().find_by_invite_code(&code).await?))
}

/// Leader adds a member.
pub async fn add_member(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
    Json(request): Json<AddMemberRequest>,
) -> Result<Json<Team>, AppError> {
    let team = state
        .engine
        .teams()
        .add_member(&actor, team_id, request.user_id)
        .await?;
    Ok(Json(team))
}

/// Leader removes a member, or a member leaves.
pub async fn remove_member(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((team_id, user_id)): Path<(TeamId, UserId)>,
) -> Result<Json<Team>, AppError> {
    let team = state
        .engine
        .teams()
        .remove_member(&actor, team_id, user_id)
        .await?;
    Ok(Json(team))
}

/// Lock the roster.
pub async fn lock_team(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
) -> Result<Json<Team>, AppError> {
    Ok(Json(state.engine.teams().lock(&actor, team_id).await?))
}

/// Reopen the roster.
pub async fn unlock_team(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
) -> Result<Json<Team>, AppError> {
    Ok(Json(state.engine.teams().unlock(&actor, team_id).await?))
}

/// Hand leadership to another member.
pub async fn transfer_leadership(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<Team>, AppError> {
    let team = state
        .engine
        .teams()
        .transfer_leadership(&actor, team_id, request.new_leader_id)
        .await?;
    Ok(Json(team))
}

/// Disband the team.
pub async fn disband_team(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
) -> Result<Json<Team>, AppError> {
    Ok(Json(state.engine.teams().disband(&actor, team_id).await?))
}

/// Issue a fresh invite code; the old one stops working.
pub async fn regenerate_invite_code(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
) -> Result<Json<Team>, AppError> {
    let team = state
        .engine
        .teams()
        .regenerate_invite_code(&actor, team_id)
        .await?;
    Ok(Json(team))
}

/// Record score and rank.
pub async fn set_standing(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(team_id): Path<TeamId>,
    Json(request): Json<StandingRequest>,
) -> Result<Json<Team>, AppError> {
    let team = state
        .engine
        .teams()
        .set_standing(&actor, team_id, request.score, request.rank)
        .await?;
    Ok(Json(team))
}
