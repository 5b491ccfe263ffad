//! Shared application state for axum handlers.

use std::sync::Arc;

use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_app::services::hub::Hub;

/// Application state shared across all axum handlers.
///
/// Generic over the switch type to avoid dynamic dispatch. `Clone` is
/// implemented manually so `D` itself does not need to be `Clone`.
pub struct AppState<D> {
    pub hub: Arc<Hub<D>>,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<D: SwitchDevice> AppState<D> {
    #[must_use]
    pub fn new(hub: Arc<Hub<D>>) -> Self {
        Self { hub }
    }
}
