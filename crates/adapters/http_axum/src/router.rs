//! Axum router assembly.

use std::path::Path;

use axum::Router;
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use remoteswitch_app::ports::SwitchDevice;

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Mounts the API under `/api` and `/api/v1.0`, the event stream at `/ws`
/// and, when `static_dir` is given, serves that directory for every other
/// path. Includes a [`TraceLayer`] that logs each HTTP request/response at
/// the `DEBUG` level using the `tracing` ecosystem.
pub fn build<D: SwitchDevice>(state: AppState<D>, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(crate::api::ws::upgrade::<D>))
        .nest("/api", crate::api::routes())
        .nest("/api/v1.0", crate::api::routes());
    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
