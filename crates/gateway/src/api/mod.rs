pub mod admin;
pub mod auth;
pub mod conversation;
pub mod error;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (liveness and capability probes) and
/// **protected** (the conversation surface, gated behind the bearer-token
/// middleware when a token is configured).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/styles", get(admin::styles));

    let protected = Router::new()
        .route("/conversation/start", post(conversation::start))
        .route(
            "/conversation/continue/:id",
            post(conversation::continue_conversation),
        )
        .route(
            "/conversation/select-option/:id",
            post(conversation::select_option),
        )
        .route(
            "/conversation/generate-final/:id",
            post(conversation::generate_final),
        )
        .route("/conversation/session/:id", get(conversation::get_session))
        .route(
            "/conversation/sessions/active",
            get(conversation::list_active),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
