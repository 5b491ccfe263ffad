//! Transport ports: how a front-end reaches switches hosted elsewhere.
//!
//! The concrete message bus is an adapter concern. A service is identified
//! by its full name (`shackbus.switch.<name>`), see
//! [`remoteswitch_domain::service`].

use std::future::Future;

use tokio::sync::mpsc;

use remoteswitch_domain::error::SwitchError;
use remoteswitch_domain::switch::{Device, Port};

/// Request/response calls into a switch service.
pub trait SwitchRpc: Send + Sync + 'static {
    /// Fetch the full state of the switch behind `service`.
    fn get_device(
        &self,
        service: &str,
    ) -> impl Future<Output = Result<Device, SwitchError>> + Send;

    /// Fetch one port of the switch behind `service`.
    fn get_port(
        &self,
        service: &str,
        port: &str,
    ) -> impl Future<Output = Result<Port, SwitchError>> + Send;

    /// Ask the switch behind `service` to apply `request`.
    ///
    /// Errors raised by the remote switch come back with their original kind.
    fn set_port(
        &self,
        service: &str,
        request: Port,
    ) -> impl Future<Output = Result<(), SwitchError>> + Send;
}

/// Pub/sub access to state topics.
pub trait StateBroker: Send + Sync + 'static {
    /// Start receiving the snapshots published on `topic`.
    ///
    /// The receiver closes when the subscription ends on the transport side.
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<Device>, SwitchError>> + Send;

    /// Stop receiving snapshots for `topic`.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), SwitchError>> + Send;
}

/// What happened to a service in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAction {
    Create,
    Update,
    Delete,
}

/// A registry membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEvent {
    pub action: RegistryAction,
    pub service: String,
}

/// Service registry membership.
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Names of every service currently known to the registry.
    fn list_services(&self) -> impl Future<Output = Result<Vec<String>, SwitchError>> + Send;

    /// Stream of membership changes from now on.
    fn watch(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<RegistryEvent>, SwitchError>> + Send;
}
