//! JSON API and WebSocket handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod switches;
pub mod ws;

use axum::Router;
use axum::routing::get;

use remoteswitch_app::ports::SwitchDevice;

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<D: SwitchDevice>() -> Router<AppState<D>> {
    Router::new()
        .route("/switches", get(switches::list::<D>))
        .route("/switch/{name}", get(switches::get::<D>))
        .route(
            "/switch/{name}/port/{port}",
            get(switches::get_port::<D>).put(switches::set_port::<D>),
        )
        .route(
            "/switch/{name}/port/{port}/terminal/{terminal}",
            get(switches::get_terminal::<D>).put(switches::set_terminal::<D>),
        )
}
