//! The switch type the hub holds: every local driver plus remote proxies.

use std::sync::Arc;

use remoteswitch_adapter_gpio::{Pin, RelayBank, Stackmatch};
use remoteswitch_adapter_ip9258::PowerStrip;
use remoteswitch_adapter_mqtt::MqttTransport;
use remoteswitch_adapter_remotebox::Remotebox;
use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_app::services::hub::Hub;
use remoteswitch_app::services::proxy::SwitchProxy;
use remoteswitch_domain::error::SwitchError;
use remoteswitch_domain::switch::{Device, Port};

use crate::config::SwitchConfig;

pub enum AnySwitch {
    Relay(RelayBank<Pin>),
    Stackmatch(Stackmatch<Pin>),
    Remotebox(Remotebox),
    PowerStrip(PowerStrip),
    Remote(SwitchProxy<MqttTransport>),
}

/// Background failure channel of a polled driver.
pub enum Failure {
    Remotebox(remoteswitch_adapter_remotebox::Failure),
    PowerStrip(remoteswitch_adapter_ip9258::Failure),
}

impl Failure {
    /// The reported failure, or `None` once the driver was closed on purpose.
    async fn reported(self) -> Option<String> {
        match self {
            Self::Remotebox(failure) => failure.await.ok().map(|err| err.to_string()),
            Self::PowerStrip(failure) => failure.await.ok().map(|err| err.to_string()),
        }
    }
}

impl From<SwitchProxy<MqttTransport>> for AnySwitch {
    fn from(proxy: SwitchProxy<MqttTransport>) -> Self {
        Self::Remote(proxy)
    }
}

impl SwitchDevice for AnySwitch {
    fn name(&self) -> &str {
        match self {
            Self::Relay(switch) => switch.name(),
            Self::Stackmatch(switch) => switch.name(),
            Self::Remotebox(switch) => switch.name(),
            Self::PowerStrip(switch) => switch.name(),
            Self::Remote(switch) => switch.name(),
        }
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        match self {
            Self::Relay(switch) => switch.get_port(name),
            Self::Stackmatch(switch) => switch.get_port(name),
            Self::Remotebox(switch) => switch.get_port(name),
            Self::PowerStrip(switch) => switch.get_port(name),
            Self::Remote(switch) => switch.get_port(name),
        }
    }

    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        match self {
            Self::Relay(switch) => switch.set_port(request).await,
            Self::Stackmatch(switch) => switch.set_port(request).await,
            Self::Remotebox(switch) => switch.set_port(request).await,
            Self::PowerStrip(switch) => switch.set_port(request).await,
            Self::Remote(switch) => switch.set_port(request).await,
        }
    }

    fn serialize(&self) -> Device {
        match self {
            Self::Relay(switch) => switch.serialize(),
            Self::Stackmatch(switch) => switch.serialize(),
            Self::Remotebox(switch) => switch.serialize(),
            Self::PowerStrip(switch) => switch.serialize(),
            Self::Remote(switch) => switch.serialize(),
        }
    }

    fn close(&self) {
        match self {
            Self::Relay(switch) => switch.close(),
            Self::Stackmatch(switch) => switch.close(),
            Self::Remotebox(switch) => switch.close(),
            Self::PowerStrip(switch) => switch.close(),
            Self::Remote(switch) => switch.close(),
        }
    }
}

/// Build the switch described by `config`.
///
/// Polled drivers also hand back the channel their background failure is
/// reported on.
///
/// # Errors
///
/// Returns the driver's construction failure as a [`SwitchError`].
pub async fn open(
    config: &SwitchConfig,
    bus: StateBus,
) -> Result<(AnySwitch, Option<Failure>), SwitchError> {
    let switch = match config {
        SwitchConfig::Relay(config) => {
            let bank = RelayBank::new(config, bus, |terminal| Pin::sysfs(&terminal.pin))?;
            AnySwitch::Relay(bank)
        }
        SwitchConfig::Dummy(config) => {
            let bank = RelayBank::new(config, bus, |terminal| Ok(Pin::memory(&terminal.pin)))?;
            AnySwitch::Relay(bank)
        }
        SwitchConfig::Stackmatch(config) => {
            let stackmatch = Stackmatch::new(config, bus, |relay| Pin::sysfs(&relay.pin))?;
            AnySwitch::Stackmatch(stackmatch)
        }
        SwitchConfig::Bandswitch(config) => {
            let bank = RelayBank::bandswitch(config, bus, |band| Pin::sysfs(&band.pin))?;
            AnySwitch::Relay(bank)
        }
        SwitchConfig::Remotebox(config) => {
            let (remotebox, failure) = Remotebox::open(config, bus).await?;
            return Ok((AnySwitch::Remotebox(remotebox), Some(Failure::Remotebox(failure))));
        }
        SwitchConfig::Ip9258(config) => {
            let (strip, failure) = PowerStrip::open(config, bus).await?;
            return Ok((AnySwitch::PowerStrip(strip), Some(Failure::PowerStrip(failure))));
        }
    };
    Ok((switch, None))
}

/// Take `device` out of the hub once its driver reports a fatal failure.
pub fn watch_failure(hub: Arc<Hub<AnySwitch>>, device: Arc<AnySwitch>, failure: Failure) {
    tokio::spawn(async move {
        if let Some(err) = failure.reported().await {
            tracing::error!(device = %device.name(), error = %err, "switch failed, removing it");
            hub.remove_switch(&device);
        }
    });
}
