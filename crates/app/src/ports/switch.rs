//! Switch port: the capability contract every driver and proxy fulfils.

use std::future::Future;

use remoteswitch_domain::error::SwitchError;
use remoteswitch_domain::switch::{Device, Port};

/// A controllable switching device, local or remote.
///
/// Implementations own their state behind their own lock and never call
/// back into the hub while holding it. State changes are announced by
/// publishing a snapshot on the [`StateBus`](crate::event_bus::StateBus).
pub trait SwitchDevice: Send + Sync + 'static {
    /// Display name, unique within a hub.
    fn name(&self) -> &str;

    /// Snapshot of one port.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::NotFound`] when the port does not exist.
    fn get_port(&self, name: &str) -> Result<Port, SwitchError>;

    /// Apply a batch of terminal state changes to one port.
    ///
    /// Resolves once the underlying I/O finished.
    fn set_port(&self, request: Port) -> impl Future<Output = Result<(), SwitchError>> + Send;

    /// Full snapshot, ports and terminals sorted by index.
    fn serialize(&self) -> Device;

    /// Release the device. Calling it more than once has no further effect.
    fn close(&self);
}
