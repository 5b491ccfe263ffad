//! Test doubles shared by the service tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use remoteswitch_domain::bank::SwitchBank;
use remoteswitch_domain::error::{NotFoundError, SwitchError, TransportError};
use remoteswitch_domain::service::state_topic;
use remoteswitch_domain::switch::{Device, Port, Terminal};

use crate::event_bus::StateBus;
use crate::ports::{
    RegistryAction, RegistryEvent, ServiceRegistry, StateBroker, SwitchDevice, SwitchRpc,
};

/// Port `P` (exclusive) with terminals `X` (index 0) and `Y` (index 1).
pub fn two_way_port() -> Port {
    Port {
        name: "P".to_string(),
        index: 0,
        exclusive: true,
        terminals: vec![Terminal::new("X", 0, false), Terminal::new("Y", 1, false)],
    }
}

/// In-memory switch driven by a [`SwitchBank`].
pub struct FakeSwitch {
    name: String,
    bank: Mutex<SwitchBank>,
    bus: Option<StateBus>,
    closed: AtomicUsize,
}

impl FakeSwitch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bank: Mutex::new(SwitchBank::new(name, 0, false, vec![two_way_port()]).unwrap()),
            bus: None,
            closed: AtomicUsize::new(0),
        }
    }

    pub fn with_bus(name: &str, bus: StateBus) -> Self {
        Self {
            bus: Some(bus),
            ..Self::new(name)
        }
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn bank(&self) -> MutexGuard<'_, SwitchBank> {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SwitchDevice for FakeSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        Ok(self.bank().port(name)?)
    }

    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        let snapshot = {
            let mut bank = self.bank();
            let writes = bank.plan(&request)?;
            let changed = bank
                .execute(writes, |_| Ok::<_, TransportError>(()))
                .map_err(|partial| partial.error)?;
            changed.then(|| bank.snapshot())
        };
        if let (Some(snapshot), Some(bus)) = (snapshot, &self.bus) {
            bus.publish(snapshot);
        }
        Ok(())
    }

    fn serialize(&self) -> Device {
        self.bank().snapshot()
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Network {
    hosted: HashMap<String, Device>,
    broken: HashSet<String>,
    stalled: HashSet<String>,
    topics: HashMap<String, mpsc::Sender<Device>>,
    watchers: Vec<mpsc::Sender<RegistryEvent>>,
    set_calls: Vec<(String, Port)>,
    unsubscribed: Vec<String>,
}

/// Transport double: a registry, RPC endpoint and broker in one map.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    network: Arc<Mutex<Network>>,
}

impl MemoryTransport {
    fn network(&self) -> MutexGuard<'_, Network> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `device` reachable as `service`.
    pub fn host(&self, service: &str, device: Device) {
        self.network().hosted.insert(service.to_string(), device);
    }

    /// Make seeding calls to `service` fail.
    pub fn break_service(&self, service: &str) {
        self.network().broken.insert(service.to_string());
    }

    /// Make seeding calls to `service` never answer.
    pub fn stall_service(&self, service: &str) {
        self.network().stalled.insert(service.to_string());
    }

    /// Deliver a registry change to every watcher.
    pub fn announce(&self, action: RegistryAction, service: &str) {
        let event = RegistryEvent {
            action,
            service: service.to_string(),
        };
        self.network()
            .watchers
            .retain(|watcher| watcher.try_send(event.clone()).is_ok());
    }

    /// Publish a snapshot on the state topic of `service`.
    pub fn push_state(&self, service: &str, device: Device) -> bool {
        self.network()
            .topics
            .get(&state_topic(service))
            .is_some_and(|sender| sender.try_send(device).is_ok())
    }

    /// End the subscription of `topic` from the transport side.
    pub fn drop_subscription(&self, topic: &str) {
        self.network().topics.remove(topic);
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.network().topics.contains_key(topic)
    }

    pub fn set_calls(&self) -> Vec<(String, Port)> {
        self.network().set_calls.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.network().unsubscribed.clone()
    }
}

impl SwitchRpc for MemoryTransport {
    fn get_device(
        &self,
        service: &str,
    ) -> impl Future<Output = Result<Device, SwitchError>> + Send {
        let network = self.network();
        let stalled = network.stalled.contains(service);
        let result: Result<Device, SwitchError> = if network.broken.contains(service) {
            Err(TransportError::new("service unreachable").into())
        } else {
            network
                .hosted
                .get(service)
                .cloned()
                .ok_or_else(|| TransportError::new("no such service").into())
        };
        async move {
            if stalled {
                std::future::pending::<()>().await;
            }
            result
        }
    }

    fn get_port(
        &self,
        service: &str,
        port: &str,
    ) -> impl Future<Output = Result<Port, SwitchError>> + Send {
        let result: Result<Port, SwitchError> = self
            .network()
            .hosted
            .get(service)
            .and_then(|device| device.port(port).cloned())
            .ok_or_else(|| NotFoundError::port(port).into());
        async move { result }
    }

    fn set_port(
        &self,
        service: &str,
        request: Port,
    ) -> impl Future<Output = Result<(), SwitchError>> + Send {
        self.network()
            .set_calls
            .push((service.to_string(), request));
        async { Ok(()) }
    }
}

impl StateBroker for MemoryTransport {
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<Device>, SwitchError>> + Send {
        let (sender, receiver) = mpsc::channel(16);
        self.network().topics.insert(topic.to_string(), sender);
        async move { Ok(receiver) }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), SwitchError>> + Send {
        let mut network = self.network();
        network.topics.remove(topic);
        network.unsubscribed.push(topic.to_string());
        async { Ok(()) }
    }
}

impl ServiceRegistry for MemoryTransport {
    fn list_services(&self) -> impl Future<Output = Result<Vec<String>, SwitchError>> + Send {
        let services: Vec<String> = self.network().hosted.keys().cloned().collect();
        async move { Ok(services) }
    }

    fn watch(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<RegistryEvent>, SwitchError>> + Send {
        let (sender, receiver) = mpsc::channel(16);
        self.network().watchers.push(sender);
        async move { Ok(receiver) }
    }
}
