//! Stackmatch: an antenna combiner whose relays do not map one-to-one
//! onto terminals.
//!
//! Each declared combination names a set of terminals and the relays that
//! must be energized for exactly that set. A request is overlaid on the
//! currently active set; the resulting set must be a declared combination.
//! Releasing every antenna is only possible when a combination without
//! terminals is declared.
//! Switching always de-energizes every relay first, then energizes the
//! relays of the new combination, so the combiner never passes through an
//! undeclared intermediate state.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use remoteswitch_app::event_bus::StateBus;
use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::combination::CombinationKey;
use remoteswitch_domain::error::{
    NotFoundError, SwitchError, UnknownCombinationError, ValidationError,
};
use remoteswitch_domain::switch::{Device, Port, Terminal};

use crate::config::{RelayConfig, StackmatchConfig};
use crate::error::GpioError;
use crate::pin::OutputPin;
use crate::relay::Relay;

#[derive(Debug, Clone, Default)]
struct Combination {
    terminals: Vec<usize>,
    relays: Vec<usize>,
}

struct State<P> {
    terminals: Vec<Terminal>,
    relays: Vec<Relay<P>>,
    combinations: HashMap<CombinationKey, Combination>,
}

impl<P: OutputPin> State<P> {
    fn port(&self, name: &str) -> Port {
        let mut port = Port {
            name: name.to_string(),
            index: 0,
            exclusive: false,
            terminals: self.terminals.clone(),
        };
        port.sort();
        port
    }

    fn active(&self) -> BTreeSet<String> {
        self.terminals
            .iter()
            .filter(|terminal| terminal.state)
            .map(|terminal| terminal.name.clone())
            .collect()
    }

    /// Overlay `request` on the active set and find the combination for it.
    fn resolve(&self, request: &Port) -> Result<Combination, SwitchError> {
        let mut desired = self.active();
        for terminal in &request.terminals {
            if !self.terminals.iter().any(|t| t.name == terminal.name) {
                return Err(ValidationError::UnknownTerminal {
                    port: request.name.clone(),
                    terminal: terminal.name.clone(),
                }
                .into());
            }
            if terminal.state {
                desired.insert(terminal.name.clone());
            } else {
                desired.remove(&terminal.name);
            }
        }

        let key = CombinationKey::new(desired);
        self.combinations.get(&key).cloned().ok_or_else(|| {
            UnknownCombinationError {
                key: key.to_string(),
            }
            .into()
        })
    }

    /// De-energize everything, then energize `target`.
    ///
    /// On a pin failure the remaining writes are skipped, no terminal is
    /// left marked active and the relays switched so far are returned with
    /// the error.
    fn switch_to(&mut self, target: &Combination) -> Result<(), (Vec<String>, GpioError)> {
        let mut switched = Vec::new();
        for terminal in &mut self.terminals {
            terminal.state = false;
        }
        for relay in &mut self.relays {
            relay.set(false).map_err(|err| (switched.clone(), err))?;
            switched.push(format!("{}=off", relay.name()));
        }
        for &idx in &target.relays {
            let relay = &mut self.relays[idx];
            relay.set(true).map_err(|err| (switched.clone(), err))?;
            switched.push(format!("{}=on", relay.name()));
        }
        for &idx in &target.terminals {
            self.terminals[idx].state = true;
        }
        Ok(())
    }
}

/// A stackmatch antenna combiner on GPIO relays.
pub struct Stackmatch<P> {
    name: String,
    index: i32,
    port: String,
    state: Mutex<State<P>>,
    bus: StateBus,
    closed: AtomicBool,
}

impl<P: OutputPin> Stackmatch<P> {
    /// Build the combiner described by `config`.
    ///
    /// Terminals and relays referenced by several combinations are created
    /// once, the first definition wins. Every relay starts de-energized.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::DuplicateCombination`] for an inconsistent table,
    /// [`ValidationError::EmptyName`] for an unnamed switch or port, and
    /// whatever `open` or the initial pin write reports.
    pub fn new(
        config: &StackmatchConfig,
        bus: StateBus,
        mut open: impl FnMut(&RelayConfig) -> Result<P, GpioError>,
    ) -> Result<Self, GpioError> {
        if config.name.is_empty() || config.port.is_empty() {
            return Err(GpioError::Layout(ValidationError::EmptyName));
        }

        let mut terminals: Vec<Terminal> = Vec::new();
        let mut relays: Vec<Relay<P>> = Vec::new();
        let mut combinations = HashMap::new();

        for combination in &config.combinations {
            let mut resolved = Combination::default();
            for terminal in &combination.terminals {
                let idx = match terminals.iter().position(|t| t.name == terminal.name) {
                    Some(idx) => idx,
                    None => {
                        terminals.push(Terminal::new(terminal.name.clone(), terminal.index, false));
                        terminals.len() - 1
                    }
                };
                resolved.terminals.push(idx);
            }
            for relay in &combination.pins {
                let idx = match relays.iter().position(|r| r.name() == relay.pin) {
                    Some(idx) => idx,
                    None => {
                        let mut created = Relay::new(open(relay)?, relay.inverted);
                        created.set(false)?;
                        relays.push(created);
                        relays.len() - 1
                    }
                };
                if !resolved.relays.contains(&idx) {
                    resolved.relays.push(idx);
                }
            }

            let key = CombinationKey::new(combination.terminals.iter().map(|t| t.name.clone()));
            if combinations.insert(key.clone(), resolved).is_some() {
                return Err(GpioError::DuplicateCombination {
                    key: key.to_string(),
                });
            }
        }

        tracing::info!(
            device = %config.name,
            terminals = terminals.len(),
            relays = relays.len(),
            combinations = combinations.len(),
            "stackmatch ready"
        );
        Ok(Self {
            name: config.name.clone(),
            index: config.index,
            port: config.port.clone(),
            state: Mutex::new(State {
                terminals,
                relays,
                combinations,
            }),
            bus,
            closed: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, State<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Energized state of every relay, by relay name.
    #[must_use]
    pub fn relay_states(&self) -> Vec<(String, bool)> {
        let mut states: Vec<(String, bool)> = self
            .state()
            .relays
            .iter()
            .map(|relay| (relay.name().to_string(), relay.is_energized()))
            .collect();
        states.sort();
        states
    }

    fn snapshot(&self, state: &State<P>) -> Device {
        Device::new(self.name.clone(), self.index, vec![state.port(&self.port)])
    }

    fn apply(&self, request: &Port) -> Result<(), SwitchError> {
        if request.name != self.port {
            return Err(ValidationError::UnknownPort {
                port: request.name.clone(),
            }
            .into());
        }

        let mut state = self.state();
        let target = state.resolve(request)?;
        let before = state.active();
        let outcome = state.switch_to(&target);
        if state.active() != before {
            self.bus.publish(self.snapshot(&state));
        }
        outcome.map_err(|(switched, err)| {
            tracing::warn!(
                device = %self.name,
                ?switched,
                error = %err,
                "combination switch interrupted"
            );
            err.into_domain()
        })
    }
}

impl<P: OutputPin> SwitchDevice for Stackmatch<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        if name != self.port {
            return Err(NotFoundError::port(name).into());
        }
        Ok(self.state().port(&self.port))
    }

    #[tracing::instrument(skip_all, fields(device = %self.name))]
    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        self.apply(&request)
    }

    fn serialize(&self) -> Device {
        let state = self.state();
        self.snapshot(&state)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state();
        for relay in &mut state.relays {
            if let Err(err) = relay.set(false) {
                tracing::warn!(device = %self.name, error = %err, "unable to release relay");
            }
        }
        tracing::info!(device = %self.name, "stackmatch closed");
    }
}
