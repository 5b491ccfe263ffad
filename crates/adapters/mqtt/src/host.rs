//! Exposes a local switch as a network service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::service::{service_name, state_topic};

use crate::error::MqttError;
use crate::rpc::{RpcCall, RpcFault, RpcReply, RpcRequest, RpcResponse};
use crate::transport::MqttTransport;

/// Calls one host answers concurrently; further calls are refused as busy.
const MAX_CONCURRENT_CALLS: usize = 8;

/// Serves one local switch on the broker.
///
/// While running it answers calls, mirrors the switch's snapshots from the
/// [`StateBus`] onto its state topic and re-announces the service at a fixed
/// interval so remote discovery keeps it alive.
pub struct ServiceHost<D> {
    device: Arc<D>,
    transport: MqttTransport,
    bus: StateBus,
    service: String,
    announce_interval: Duration,
}

impl<D: SwitchDevice> ServiceHost<D> {
    pub fn new(
        device: Arc<D>,
        transport: MqttTransport,
        bus: StateBus,
        prefix: &str,
        announce_interval: Duration,
    ) -> Self {
        let service = service_name(prefix, device.name());
        Self {
            device,
            transport,
            bus,
            service,
            announce_interval,
        }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Serve until `cancel` fires, then withdraw the announcement.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError`] when the service cannot be set up or withdrawn.
    #[tracing::instrument(skip_all, fields(service = %self.service))]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), MqttError> {
        let mut requests = self.transport.serve(&self.service).await?;
        let mut states = self.bus.subscribe();
        let topic = state_topic(&self.service);
        let mut announce = tokio::time::interval(self.announce_interval);
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_CALLS));
        tracing::info!("hosting switch");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = announce.tick() => {
                    let announced = self.transport.announce(&self.service, self.device.name());
                    if let Err(err) = announced.await {
                        tracing::warn!(error = %err, "announcement failed");
                    }
                }
                request = requests.recv() => match request {
                    Some(request) => {
                        dispatch(&permits, &self.device, &self.transport, request);
                    }
                    None => break,
                },
                state = states.recv() => match state {
                    Ok(device) if device.name == self.device.name() => {
                        if let Err(err) = self.transport.publish_state(&topic, &device).await {
                            tracing::warn!(error = %err, "state publication failed");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "state host lagging, snapshots dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.transport.withdraw(&self.service).await?;
        tracing::info!("switch withdrawn");
        Ok(())
    }
}

/// Answer `request` on its own task while a permit is free, otherwise refuse
/// it with a busy fault. Returns whether the call was accepted.
fn dispatch<D: SwitchDevice>(
    permits: &Arc<Semaphore>,
    device: &Arc<D>,
    transport: &MqttTransport,
    request: RpcRequest,
) -> bool {
    let device = Arc::clone(device);
    let transport = transport.clone();
    match Arc::clone(permits).try_acquire_owned() {
        Ok(permit) => {
            tokio::spawn(async move {
                let result = respond(device.as_ref(), request.call).await;
                drop(permit);
                reply(&transport, device.name(), &request.reply_to, request.id, result).await;
            });
            true
        }
        Err(_) => {
            tracing::warn!(device = %device.name(), "too many calls in flight, refusing");
            let busy = RpcResponse {
                id: request.id,
                result: Err(RpcFault::Transport {
                    message: "service busy".to_string(),
                }),
            };
            if let Err(err) = transport.try_reply(&request.reply_to, &busy) {
                tracing::warn!(device = %device.name(), error = %err, "unable to refuse rpc call");
            }
            false
        }
    }
}

async fn reply(
    transport: &MqttTransport,
    device: &str,
    reply_to: &str,
    id: uuid::Uuid,
    result: Result<RpcReply, RpcFault>,
) {
    let response = RpcResponse { id, result };
    if let Err(err) = transport.reply(reply_to, &response).await {
        tracing::warn!(%device, error = %err, "unable to send rpc reply");
    }
}

/// Execute one call against `device`.
pub async fn respond<D: SwitchDevice>(device: &D, call: RpcCall) -> Result<RpcReply, RpcFault> {
    let result = match call {
        RpcCall::GetDevice => Ok(RpcReply::Device(device.serialize())),
        RpcCall::GetPort { port } => device.get_port(&port).map(RpcReply::Port),
        RpcCall::SetPort { request } => device.set_port(request).await.map(|()| RpcReply::Done),
    };
    result.map_err(|err| RpcFault::from(&err))
}
