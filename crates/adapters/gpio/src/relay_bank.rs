//! Relay bank: one relay per terminal, exclusivity enforced by
//! [`SwitchBank`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::bank::SwitchBank;
use remoteswitch_domain::error::SwitchError;
use remoteswitch_domain::switch::{Device, Port, Terminal};

use crate::config::{RelayBankConfig, TerminalConfig};
use crate::error::GpioError;
use crate::pin::OutputPin;
use crate::relay::Relay;

type RelayKey = (String, String);

struct State<P> {
    bank: SwitchBank,
    relays: HashMap<RelayKey, Relay<P>>,
}

/// A GPIO relay bank.
pub struct RelayBank<P> {
    name: String,
    state: Mutex<State<P>>,
    bus: StateBus,
    closed: AtomicBool,
}

impl<P: OutputPin> RelayBank<P> {
    /// Build the bank described by `config`, opening one pin per terminal
    /// through `open`. Every relay starts de-energized.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::Layout`] for duplicate names, or whatever `open`
    /// or the initial pin write reports.
    pub fn new(
        config: &RelayBankConfig,
        bus: StateBus,
        mut open: impl FnMut(&TerminalConfig) -> Result<P, GpioError>,
    ) -> Result<Self, GpioError> {
        let ports = config
            .ports
            .iter()
            .map(|port| Port {
                name: port.name.clone(),
                index: port.index,
                exclusive: port.exclusive,
                terminals: port
                    .terminals
                    .iter()
                    .map(|terminal| Terminal::new(terminal.name.clone(), terminal.index, false))
                    .collect(),
            })
            .collect();
        let bank = SwitchBank::new(config.name.clone(), config.index, config.exclusive, ports)
            .map_err(GpioError::Layout)?;

        let mut relays = HashMap::new();
        for port in &config.ports {
            for terminal in &port.terminals {
                let mut relay = Relay::new(open(terminal)?, terminal.inverted);
                relay.set(false)?;
                relays.insert((port.name.clone(), terminal.name.clone()), relay);
            }
        }

        tracing::info!(device = %config.name, relays = relays.len(), "relay bank ready");
        Ok(Self {
            name: config.name.clone(),
            state: Mutex::new(State { bank, relays }),
            bus,
            closed: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, State<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, request: &Port) -> Result<(), SwitchError> {
        let mut state = self.state();
        let State { bank, relays } = &mut *state;
        let writes = bank.plan(request)?;
        let outcome = bank.execute(writes, |write| {
            relays
                .get_mut(&(write.port.clone(), write.terminal.clone()))
                .map_or(Ok(()), |relay| relay.set(write.state))
        });
        match outcome {
            Ok(changed) => {
                if changed {
                    self.bus.publish(bank.snapshot());
                }
                Ok(())
            }
            Err(partial) => {
                let applied: Vec<&str> = partial
                    .applied
                    .iter()
                    .map(|write| write.terminal.as_str())
                    .collect();
                tracing::warn!(
                    device = %self.name,
                    port = %request.name,
                    ?applied,
                    error = %partial.error,
                    "set port interrupted, earlier writes stay applied"
                );
                if partial.changed {
                    self.bus.publish(bank.snapshot());
                }
                Err(partial.error.into_domain())
            }
        }
    }
}

impl<P: OutputPin> SwitchDevice for RelayBank<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        Ok(self.state().bank.port(name)?)
    }

    #[tracing::instrument(skip_all, fields(device = %self.name, port = %request.name))]
    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        self.apply(&request)
    }

    fn serialize(&self) -> Device {
        self.state().bank.snapshot()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state();
        for relay in state.relays.values_mut() {
            if let Err(err) = relay.set(false) {
                tracing::warn!(device = %self.name, error = %err, "unable to release relay");
            }
        }
        tracing::info!(device = %self.name, "relay bank closed");
    }
}
