//! Router configuration.

use crate::handlers::{events, health_check, registrations, rounds, teams};
use crate::middleware::request_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use roundhouse_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the API router.
///
/// Every engine operation is mounted under `/api`; `/health` sits outside it.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Events
        .route("/events", post(events::create_event))
        .route("/events/:id", get(events::get_event))
        // Rounds and progression
        .route(
            "/events/:id/rounds",
            get(rounds::list_rounds).post(rounds::create_round),
        )
        .route(
            "/events/:id/rounds/:number",
            get(rounds::get_round)
                .patch(rounds::update_round)
                .delete(rounds::delete_round),
        )
        .route("/events/:id/rounds/:number/advance", post(rounds::advance))
        // Teams
        .route(
            "/events/:id/teams",
            get(teams::list_teams).post(teams::create_team),
        )
        .route("/teams/join", post(teams::join_team))
        .route("/teams/by-code/:code", get(teams::find_by_invite_code))
        .route("/teams/:id", get(teams::get_team))
        .route("/teams/:id/members", post(teams::add_member))
        .route("/teams/:id/members/:user_id", delete(teams::remove_member))
        .route("/teams/:id/lock", post(teams::lock_team))
        .route("/teams/:id/unlock", post(teams::unlock_team))
        .route("/teams/:id/transfer", post(teams::transfer_leadership))
        .route("/teams/:id/disband", post(teams::disband_team))
        .route("/teams/:id/invite-code", post(teams::regenerate_invite_code))
        .route("/teams/:id/standing", put(teams::set_standing))
        // Registrations
        .route(
            "/events/:id/registrations",
            get(registrations::list_registrations).post(registrations::register),
        )
        .route("/registrations/:id", get(registrations::get_registration))
        .route("/registrations/:id/cancel", post(registrations::cancel))
        .route("/registrations/:id/approve", post(registrations::approve))
        .route("/registrations/:id/reject", post(registrations::reject))
        .route("/registrations/:id/promote", post(registrations::promote));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

/// Build the Prometheus scrape router served on the metrics port.
pub fn metrics_router(server: Arc<MetricsServer>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(server)
}

#[allow(clippy::unused_async)]
async fn render_metrics(State(server): State<Arc<MetricsServer>>) -> (StatusCode, String) {
    match server.render() {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
