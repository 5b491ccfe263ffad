//! Hub: the in-process registry of visible switches and the fan-out of
//! their changes to interactive clients.
//!
//! Registry mutations and event emission happen under the same write lock,
//! so a client never sees an `add` or `remove` out of order with the
//! registry change that caused it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use remoteswitch_domain::error::{DuplicateNameError, SwitchError};
use remoteswitch_domain::event::HubEvent;
use remoteswitch_domain::switch::Device;

use crate::ports::SwitchDevice;

/// A new client's view of the hub: the synthetic `add` events describing
/// the current registry, and the queue of every event that follows.
pub struct HubSubscription {
    pub replay: Vec<HubEvent>,
    pub receiver: broadcast::Receiver<HubEvent>,
}

/// Registry of switches keyed by name.
pub struct Hub<D> {
    switches: RwLock<HashMap<String, Arc<D>>>,
    events: broadcast::Sender<HubEvent>,
}

impl<D: SwitchDevice> Hub<D> {
    /// Create an empty hub; each client queue holds up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            switches: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<D>>> {
        self.switches.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<D>>> {
        self.switches.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: HubEvent) {
        // no connected client is not an error
        let _ = self.events.send(event);
    }

    /// Register a switch under its name and announce it.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::DuplicateName`] when a switch with the same
    /// name is already registered; the registry is left untouched.
    #[tracing::instrument(skip_all, fields(device = %device.name()))]
    pub fn add_switch(&self, device: Arc<D>) -> Result<(), SwitchError> {
        let name = device.name().to_string();
        let mut switches = self.write();
        if switches.contains_key(&name) {
            return Err(DuplicateNameError { name }.into());
        }
        self.emit(HubEvent::add(device.serialize()));
        switches.insert(name, device);
        tracing::info!("switch added");
        Ok(())
    }

    /// Announce the removal of `device`, drop it from the registry and close it.
    ///
    /// Only the registered instance is removed: a call with a stale handle,
    /// or a second call for the same instance, is a no-op returning `false`.
    #[tracing::instrument(skip_all, fields(device = %device.name()))]
    pub fn remove_switch(&self, device: &Arc<D>) -> bool {
        {
            let mut switches = self.write();
            match switches.get(device.name()) {
                Some(current) if Arc::ptr_eq(current, device) => {}
                _ => {
                    tracing::debug!("switch not registered, nothing to remove");
                    return false;
                }
            }
            self.emit(HubEvent::remove(device.serialize()));
            switches.remove(device.name());
        }
        device.close();
        tracing::info!("switch removed");
        true
    }

    /// Look up a switch by name.
    #[must_use]
    pub fn switch(&self, name: &str) -> Option<Arc<D>> {
        self.read().get(name).cloned()
    }

    /// Every registered switch.
    #[must_use]
    pub fn switches(&self) -> Vec<Arc<D>> {
        self.read().values().cloned().collect()
    }

    /// Number of registered switches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Fan a fresh snapshot out to every client as an `update` event.
    ///
    /// Snapshots of switches that are not (or no longer) registered are dropped.
    pub fn broadcast(&self, device: Device) {
        let switches = self.write();
        if !switches.contains_key(&device.name) {
            tracing::debug!(device = %device.name, "dropping update of unregistered switch");
            return;
        }
        self.emit(HubEvent::update(device));
    }

    /// Register a new client.
    #[must_use]
    pub fn subscribe(&self) -> HubSubscription {
        let switches = self.write();
        let receiver = self.events.subscribe();
        let mut replay: Vec<HubEvent> = switches
            .values()
            .map(|device| HubEvent::add(device.serialize()))
            .collect();
        replay.sort_by(|a, b| a.device_name.cmp(&b.device_name));
        HubSubscription { replay, receiver }
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Relay every snapshot from `states` to the clients until `cancel` fires
    /// or the bus closes.
    pub async fn forward(
        self: Arc<Self>,
        mut states: broadcast::Receiver<Device>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                state = states.recv() => match state {
                    Ok(device) => self.broadcast(device),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "hub forwarder lagged, state snapshots dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("hub forwarder stopped");
    }
}
