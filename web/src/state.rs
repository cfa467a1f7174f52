//! Application state shared by all handlers.

use roundhouse_runtime::Engine;

/// Application state shared across all HTTP handlers.
///
/// The engine is stateless apart from its store handle and read cache, so
/// cloning the state per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Round, team, capacity and progression components
    pub engine: Engine,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(engine: Engine) -> Self {
        Self { engine }
    }
}
