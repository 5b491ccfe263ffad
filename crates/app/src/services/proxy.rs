//! Remote proxy: a local stand-in for a switch hosted by another process.
//!
//! A proxy seeds its snapshot with one `GetDevice` call, then follows the
//! service's state topic. Control requests are forwarded as RPC calls; the
//! resulting state change comes back through the topic like any other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use remoteswitch_domain::error::{
    InitError, NotFoundError, SwitchError, TransportError, ValidationError,
};
use remoteswitch_domain::service::{display_name, state_topic};
use remoteswitch_domain::switch::{Device, Port};

use crate::event_bus::StateBus;
use crate::ports::{StateBroker, SwitchDevice, SwitchRpc};

struct Inner<T> {
    name: String,
    service: String,
    topic: String,
    transport: T,
    device: RwLock<Device>,
    bus: StateBus,
    closed: AtomicBool,
    disposed: CancellationToken,
}

/// Mirror of a remote switch. Cloning yields another handle to the same proxy.
pub struct SwitchProxy<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SwitchProxy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SwitchProxy<T> {
    /// Full name of the service this proxy mirrors.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// `true` when both handles point at the same proxy.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolves once the proxy has been closed.
    pub async fn disposed(&self) {
        self.inner.disposed.cancelled().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Device {
        self.inner
            .device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the snapshot wholesale. Returns `false` when nothing changed.
    fn apply(&self, mut device: Device) -> bool {
        device.name.clone_from(&self.inner.name);
        device.sort();
        {
            let mut current = self
                .inner
                .device
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *current == device {
                return false;
            }
            *current = device.clone();
        }
        self.inner.bus.publish(device);
        true
    }
}

impl<T: SwitchRpc + StateBroker> SwitchProxy<T> {
    /// Create a proxy for `service`: fetch its full state, then follow its
    /// state topic.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Init`] when the state cannot be fetched or the
    /// topic cannot be subscribed; nothing is left running in that case.
    #[tracing::instrument(skip(transport, bus))]
    pub async fn connect(
        service: &str,
        transport: T,
        bus: StateBus,
    ) -> Result<Self, SwitchError> {
        let seed = transport.get_device(service).await.map_err(|err| {
            InitError::with_source(format!("unable to fetch state of {service}"), err)
        })?;

        let topic = state_topic(service);
        let updates = transport.subscribe(&topic).await.map_err(|err| {
            InitError::with_source(format!("unable to subscribe to {topic}"), err)
        })?;

        let name = display_name(service);
        let mut device = seed;
        device.name.clone_from(&name);
        device.sort();

        let proxy = Self {
            inner: Arc::new(Inner {
                name,
                service: service.to_string(),
                topic,
                transport,
                device: RwLock::new(device),
                bus,
                closed: AtomicBool::new(false),
                disposed: CancellationToken::new(),
            }),
        };
        tokio::spawn(proxy.clone().follow(updates));
        tracing::info!(device = %proxy.inner.name, "proxy created");
        Ok(proxy)
    }

    async fn follow(self, mut updates: mpsc::Receiver<Device>) {
        loop {
            tokio::select! {
                () = self.inner.disposed.cancelled() => break,
                update = updates.recv() => match update {
                    Some(device) => {
                        if !self.apply(device) {
                            tracing::trace!(service = %self.inner.service, "state unchanged");
                        }
                    }
                    None => {
                        tracing::warn!(service = %self.inner.service, "state subscription ended");
                        self.close();
                        break;
                    }
                },
            }
        }
        if let Err(err) = self.inner.transport.unsubscribe(&self.inner.topic).await {
            tracing::warn!(service = %self.inner.service, error = %err, "unable to unsubscribe");
        }
    }
}

impl<T: SwitchRpc + StateBroker> SwitchDevice for SwitchProxy<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        let device = self.inner.device.read().unwrap_or_else(PoisonError::into_inner);
        device
            .port(name)
            .cloned()
            .ok_or_else(|| NotFoundError::port(name).into())
    }

    #[tracing::instrument(skip_all, fields(device = %self.inner.name, port = %request.name))]
    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        if self.is_closed() {
            return Err(TransportError::new("proxy is closed").into());
        }
        {
            let device = self.inner.device.read().unwrap_or_else(PoisonError::into_inner);
            let port = device
                .port(&request.name)
                .ok_or_else(|| ValidationError::UnknownPort {
                    port: request.name.clone(),
                })?;
            if let Some(unknown) = request
                .terminals
                .iter()
                .find(|terminal| port.terminal(&terminal.name).is_none())
            {
                return Err(ValidationError::UnknownTerminal {
                    port: port.name.clone(),
                    terminal: unknown.name.clone(),
                }
                .into());
            }
        }
        self.inner
            .transport
            .set_port(&self.inner.service, request)
            .await
    }

    fn serialize(&self) -> Device {
        self.snapshot()
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.disposed.cancel();
        tracing::info!(device = %self.inner.name, "proxy closed");
    }
}
