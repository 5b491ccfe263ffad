//! MQTT implementation of the transport ports.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use remoteswitch_app::ports::{
    RegistryAction, RegistryEvent, ServiceRegistry, StateBroker, SwitchRpc,
};
use remoteswitch_domain::error::SwitchError;
use remoteswitch_domain::switch::{Device, Port};

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::rpc::{Announcement, RpcCall, RpcReply, RpcRequest, RpcResponse};
use crate::topics::{Incoming, Topics};

/// Capacity of the client request queue and of every per-consumer queue.
const QUEUE_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// How long shutdown keeps flushing queued publications.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Tables {
    /// Topic filters to restore after a reconnect.
    subscriptions: BTreeSet<String>,
    pending: HashMap<Uuid, oneshot::Sender<RpcResponse>>,
    /// State consumers by broker topic.
    states: HashMap<String, mpsc::Sender<Device>>,
    /// Hosted services by service name.
    handlers: HashMap<String, mpsc::Sender<RpcRequest>>,
    known: BTreeSet<String>,
    watchers: Vec<mpsc::Sender<RegistryEvent>>,
}

struct Inner {
    client: AsyncClient,
    topics: Topics,
    client_id: String,
    reply_topic: String,
    rpc_timeout: Duration,
    tables: Mutex<Tables>,
}

impl Inner {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn subscribe(&self, topic: String) -> Result<(), MqttError> {
        self.tables().subscriptions.insert(topic.clone());
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(MqttError::Client)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.tables().subscriptions.remove(topic);
        self.client
            .unsubscribe(topic)
            .await
            .map_err(MqttError::Client)
    }

    async fn publish(
        &self,
        topic: String,
        retain: bool,
        payload: &impl Serialize,
    ) -> Result<(), MqttError> {
        let payload = serde_json::to_vec(payload).map_err(MqttError::Payload)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(MqttError::Client)
    }

    fn resubscribe(&self) {
        let topics: Vec<String> = self.tables().subscriptions.iter().cloned().collect();
        for topic in topics {
            if let Err(err) = self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                tracing::warn!(%topic, error = %err, "unable to restore subscription");
            }
        }
    }

    /// Dispatch one incoming publication.
    fn route(&self, topic: &str, payload: &[u8]) {
        match self.topics.classify(topic) {
            Incoming::Reply => self.route_reply(payload),
            Incoming::Registry(service) => self.route_announcement(service, payload),
            Incoming::Rpc(service) => self.route_call(service, payload),
            Incoming::Other => self.route_state(topic, payload),
        }
    }

    fn route_reply(&self, payload: &[u8]) {
        let response: RpcResponse = match serde_json::from_slice(payload) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "malformed rpc reply");
                return;
            }
        };
        let waiting = self.tables().pending.remove(&response.id);
        match waiting {
            Some(sender) => {
                if sender.send(response).is_err() {
                    tracing::debug!("rpc caller gave up before the reply");
                }
            }
            None => tracing::debug!(id = %response.id, "reply without pending call"),
        }
    }

    fn route_announcement(&self, service: &str, payload: &[u8]) {
        let mut tables = self.tables();
        let action = if payload.is_empty() {
            if !tables.known.remove(service) {
                return;
            }
            RegistryAction::Delete
        } else if tables.known.insert(service.to_string()) {
            RegistryAction::Create
        } else {
            RegistryAction::Update
        };
        let event = RegistryEvent {
            action,
            service: service.to_string(),
        };
        tables.watchers.retain(|watcher| match watcher.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%service, "registry watcher lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn route_call(&self, service: &str, payload: &[u8]) {
        let request: RpcRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%service, error = %err, "malformed rpc request");
                return;
            }
        };
        let mut tables = self.tables();
        let Some(handler) = tables.handlers.get(service) else {
            return;
        };
        match handler.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%service, "service busy, rpc request dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tables.handlers.remove(service);
            }
        }
    }

    fn route_state(&self, topic: &str, payload: &[u8]) {
        let mut tables = self.tables();
        let Some(consumer) = tables.states.get(topic) else {
            return;
        };
        let device: Device = match serde_json::from_slice(payload) {
            Ok(device) => device,
            Err(err) => {
                tracing::warn!(%topic, error = %err, "malformed state snapshot");
                return;
            }
        };
        match consumer.try_send(device) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%topic, "state consumer lagging, snapshot dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tables.states.remove(topic);
            }
        }
    }

    #[tracing::instrument(skip_all, fields(%service))]
    async fn call(&self, service: &str, call: RpcCall) -> Result<RpcReply, SwitchError> {
        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        self.tables().pending.insert(id, sender);

        let request = RpcRequest {
            id,
            reply_to: self.reply_topic.clone(),
            call,
        };
        if let Err(err) = self.publish(self.topics.rpc(service), false, &request).await {
            self.tables().pending.remove(&id);
            return Err(err.into_domain());
        }

        match tokio::time::timeout(self.rpc_timeout, receiver).await {
            Ok(Ok(response)) => response.result.map_err(crate::rpc::RpcFault::into_domain),
            Ok(Err(_)) => Err(MqttError::Stopped.into_domain()),
            Err(_) => {
                self.tables().pending.remove(&id);
                Err(MqttError::Timeout {
                    service: service.to_string(),
                    timeout: self.rpc_timeout,
                }
                .into_domain())
            }
        }
    }
}

/// Client side of the broker connection. Cheap to clone.
#[derive(Clone)]
pub struct MqttTransport {
    inner: Arc<Inner>,
}

/// Drives the broker connection; see [`MqttDriver::run`].
pub struct MqttDriver {
    eventloop: EventLoop,
    transport: MqttTransport,
}

impl MqttTransport {
    /// Create the client. Nothing reaches the broker until the returned
    /// [`MqttDriver`] runs.
    #[must_use]
    pub fn new(config: &MqttConfig) -> (Self, MqttDriver) {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        let (client, eventloop) = AsyncClient::new(options, QUEUE_CAPACITY);

        let topics = Topics::new(config.base_topic.clone());
        let reply_topic = topics.reply(&config.client_id);
        let mut tables = Tables::default();
        tables.subscriptions.insert(topics.registry_filter());
        tables.subscriptions.insert(reply_topic.clone());

        let transport = Self {
            inner: Arc::new(Inner {
                client,
                topics,
                client_id: config.client_id.clone(),
                reply_topic,
                rpc_timeout: config.rpc_timeout(),
                tables: Mutex::new(tables),
            }),
        };
        let driver = MqttDriver {
            eventloop,
            transport: transport.clone(),
        };
        (transport, driver)
    }

    /// Client id this transport connects with.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Start receiving the calls addressed to `service`.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Client`] when the subscription cannot be queued.
    pub async fn serve(&self, service: &str) -> Result<mpsc::Receiver<RpcRequest>, MqttError> {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        self.inner
            .tables()
            .handlers
            .insert(service.to_string(), sender);
        self.inner.subscribe(self.inner.topics.rpc(service)).await?;
        Ok(receiver)
    }

    /// Answer a call.
    ///
    /// # Errors
    ///
    /// Returns the encoding or client failure.
    pub async fn reply(&self, reply_to: &str, response: &RpcResponse) -> Result<(), MqttError> {
        self.inner.publish(reply_to.to_string(), false, response).await
    }

    /// Queue an answer without waiting for room in the client queue.
    ///
    /// # Errors
    ///
    /// Returns the encoding failure, or [`MqttError::Client`] when the queue
    /// is full.
    pub fn try_reply(&self, reply_to: &str, response: &RpcResponse) -> Result<(), MqttError> {
        let payload = serde_json::to_vec(response).map_err(MqttError::Payload)?;
        self.inner
            .client
            .try_publish(reply_to, QoS::AtLeastOnce, false, payload)
            .map_err(MqttError::Client)
    }

    /// Publish the retained announcement of `service`.
    ///
    /// # Errors
    ///
    /// Returns the encoding or client failure.
    pub async fn announce(&self, service: &str, name: &str) -> Result<(), MqttError> {
        let announcement = Announcement {
            name: name.to_string(),
            host: self.inner.client_id.clone(),
        };
        self.inner
            .publish(self.inner.topics.registry(service), true, &announcement)
            .await
    }

    /// Clear the announcement of `service` and stop serving its calls.
    ///
    /// # Errors
    ///
    /// Returns the client failure.
    pub async fn withdraw(&self, service: &str) -> Result<(), MqttError> {
        self.inner.tables().handlers.remove(service);
        self.inner
            .client
            .publish(
                self.inner.topics.registry(service),
                QoS::AtLeastOnce,
                true,
                Vec::new(),
            )
            .await
            .map_err(MqttError::Client)?;
        self.inner.unsubscribe(&self.inner.topics.rpc(service)).await
    }

    /// Publish a snapshot on the state topic `topic`.
    ///
    /// # Errors
    ///
    /// Returns the encoding or client failure.
    pub async fn publish_state(&self, topic: &str, device: &Device) -> Result<(), MqttError> {
        self.inner
            .publish(self.inner.topics.state(topic), false, device)
            .await
    }
}

impl SwitchRpc for MqttTransport {
    async fn get_device(&self, service: &str) -> Result<Device, SwitchError> {
        match self.inner.call(service, RpcCall::GetDevice).await? {
            RpcReply::Device(device) => Ok(device),
            _ => Err(unexpected(service)),
        }
    }

    async fn get_port(&self, service: &str, port: &str) -> Result<Port, SwitchError> {
        let call = RpcCall::GetPort {
            port: port.to_string(),
        };
        match self.inner.call(service, call).await? {
            RpcReply::Port(port) => Ok(port),
            _ => Err(unexpected(service)),
        }
    }

    async fn set_port(&self, service: &str, request: Port) -> Result<(), SwitchError> {
        match self.inner.call(service, RpcCall::SetPort { request }).await? {
            RpcReply::Done => Ok(()),
            _ => Err(unexpected(service)),
        }
    }
}

fn unexpected(service: &str) -> SwitchError {
    MqttError::UnexpectedReply {
        service: service.to_string(),
    }
    .into_domain()
}

impl StateBroker for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Device>, SwitchError> {
        let broker_topic = self.inner.topics.state(topic);
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        self.inner
            .tables()
            .states
            .insert(broker_topic.clone(), sender);
        self.inner.subscribe(broker_topic).await?;
        Ok(receiver)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), SwitchError> {
        let broker_topic = self.inner.topics.state(topic);
        self.inner.tables().states.remove(&broker_topic);
        self.inner.unsubscribe(&broker_topic).await?;
        Ok(())
    }
}

impl ServiceRegistry for MqttTransport {
    async fn list_services(&self) -> Result<Vec<String>, SwitchError> {
        Ok(self.inner.tables().known.iter().cloned().collect())
    }

    async fn watch(&self) -> Result<mpsc::Receiver<RegistryEvent>, SwitchError> {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        self.inner.tables().watchers.push(sender);
        Ok(receiver)
    }
}

impl MqttDriver {
    /// Poll the broker connection until `cancel` fires, reconnecting after
    /// failures and restoring subscriptions on every connect. On
    /// cancellation queued publications are flushed before disconnecting.
    pub async fn run(mut self, cancel: CancellationToken) {
        let inner = Arc::clone(&self.transport.inner);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!(client_id = %inner.client_id, "connected to broker");
                        inner.resubscribe();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        inner.route(&publish.topic, &publish.payload);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "broker connection lost, retrying");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }

        // pending callers fail right away instead of waiting for their timeout
        inner.tables().pending.clear();
        if inner.client.try_disconnect().is_err() {
            return;
        }
        let drain = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::debug!("broker did not drain before shutdown");
        }
        tracing::info!("mqtt transport stopped");
    }
}
