//! Exclusivity engine shared by every terminal-per-output driver.
//!
//! [`SwitchBank`] owns the logical state of a switch. A control request is
//! first turned into an ordered list of [`TerminalWrite`]s by
//! [`SwitchBank::plan`], which performs all validation and conflict checks
//! without touching any state. The driver then performs the physical writes
//! through [`SwitchBank::execute`], which commits each write only after the
//! underlying I/O succeeded.

use crate::error::{ConflictError, NotFoundError, SwitchError, ValidationError};
use crate::switch::{Device, Port};

/// One terminal state change to push to the hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalWrite {
    pub port: String,
    pub terminal: String,
    pub state: bool,
}

/// Writes that went through before an I/O failure interrupted a batch.
#[derive(Debug)]
pub struct PartialApply<E> {
    /// Writes committed before the failure, in order.
    pub applied: Vec<TerminalWrite>,
    /// Whether any committed write changed a terminal's state.
    pub changed: bool,
    pub error: E,
}

/// Logical state of a switch with one output per terminal.
#[derive(Debug, Clone)]
pub struct SwitchBank {
    name: String,
    index: i32,
    exclusive: bool,
    ports: Vec<Port>,
}

impl SwitchBank {
    /// Create a bank from its port layout.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the name is empty, or when a port
    /// name or a terminal name within a port is declared twice.
    pub fn new(
        name: impl Into<String>,
        index: i32,
        exclusive: bool,
        ports: Vec<Port>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        for (pos, port) in ports.iter().enumerate() {
            if ports[..pos].iter().any(|other| other.name == port.name) {
                return Err(ValidationError::DuplicatePort {
                    port: port.name.clone(),
                });
            }
            for (tpos, terminal) in port.terminals.iter().enumerate() {
                if port.terminals[..tpos]
                    .iter()
                    .any(|other| other.name == terminal.name)
                {
                    return Err(ValidationError::DuplicateTerminal {
                        port: port.name.clone(),
                        terminal: terminal.name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            name,
            index,
            exclusive,
            ports,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Snapshot of one port, terminals sorted by index.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when no port has that name.
    pub fn port(&self, name: &str) -> Result<Port, NotFoundError> {
        let mut port = self
            .ports
            .iter()
            .find(|port| port.name == name)
            .cloned()
            .ok_or_else(|| NotFoundError::port(name))?;
        port.sort();
        Ok(port)
    }

    /// Full snapshot, sorted by index.
    #[must_use]
    pub fn snapshot(&self) -> Device {
        Device::new(self.name.clone(), self.index, self.ports.clone())
    }

    /// Every `(port, terminal)` pair of the bank.
    pub fn terminals(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ports.iter().flat_map(|port| {
            port.terminals
                .iter()
                .map(move |terminal| (port.name.as_str(), terminal.name.as_str()))
        })
    }

    /// Turn a control request into the ordered writes that realize it.
    ///
    /// Nothing is modified. When the port is exclusive, the currently active
    /// terminals that the request does not keep active are switched off
    /// first. A terminal listed twice in the request takes its last state.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownPort`] / [`ValidationError::UnknownTerminal`]
    ///   for names that do not exist.
    /// - [`ValidationError::MultipleActivations`] when an exclusive port is
    ///   asked to activate more than one terminal.
    /// - [`ConflictError`] when the switch is exclusive and any requested
    ///   terminal, whatever its requested state, is active on another port.
    pub fn plan(&self, request: &Port) -> Result<Vec<TerminalWrite>, SwitchError> {
        let port = self
            .ports
            .iter()
            .find(|port| port.name == request.name)
            .ok_or_else(|| ValidationError::UnknownPort {
                port: request.name.clone(),
            })?;

        let mut desired: Vec<(&str, bool)> = Vec::with_capacity(request.terminals.len());
        for terminal in &request.terminals {
            if port.terminal(&terminal.name).is_none() {
                return Err(ValidationError::UnknownTerminal {
                    port: port.name.clone(),
                    terminal: terminal.name.clone(),
                }
                .into());
            }
            match desired.iter_mut().find(|(name, _)| *name == terminal.name) {
                Some(entry) => entry.1 = terminal.state,
                None => desired.push((terminal.name.as_str(), terminal.state)),
            }
        }

        let activations: Vec<&str> = desired
            .iter()
            .filter(|(_, state)| *state)
            .map(|(name, _)| *name)
            .collect();

        if self.exclusive {
            for other in self.ports.iter().filter(|other| other.name != port.name) {
                if let Some((name, _)) = desired
                    .iter()
                    .find(|(name, _)| other.terminal(name).is_some_and(|t| t.state))
                {
                    return Err(ConflictError {
                        terminal: (*name).to_string(),
                        port: other.name.clone(),
                    }
                    .into());
                }
            }
        }

        let mut writes = Vec::new();
        if port.exclusive {
            if activations.len() > 1 {
                return Err(ValidationError::MultipleActivations {
                    port: port.name.clone(),
                }
                .into());
            }
            writes.extend(
                port.active()
                    .filter(|name| !activations.contains(name))
                    .map(|name| TerminalWrite {
                        port: port.name.clone(),
                        terminal: name.to_string(),
                        state: false,
                    }),
            );
        }
        writes.extend(desired.into_iter().map(|(name, state)| TerminalWrite {
            port: port.name.clone(),
            terminal: name.to_string(),
            state,
        }));
        Ok(writes)
    }

    /// Record a write that has reached the hardware.
    ///
    /// Returns `true` when the terminal's state actually changed.
    pub fn commit(&mut self, write: &TerminalWrite) -> bool {
        let terminal = self
            .ports
            .iter_mut()
            .find(|port| port.name == write.port)
            .and_then(|port| {
                port.terminals
                    .iter_mut()
                    .find(|terminal| terminal.name == write.terminal)
            });
        match terminal {
            Some(terminal) if terminal.state != write.state => {
                terminal.state = write.state;
                true
            }
            _ => false,
        }
    }

    /// Perform `writes` in order through `io`, committing each one after it
    /// succeeded.
    ///
    /// Returns whether any terminal changed. The first I/O failure stops the
    /// batch; the writes already performed stay committed and are reported
    /// back in [`PartialApply`].
    ///
    /// # Errors
    ///
    /// Returns [`PartialApply`] carrying the I/O error on the first failure.
    pub fn execute<E>(
        &mut self,
        writes: Vec<TerminalWrite>,
        mut io: impl FnMut(&TerminalWrite) -> Result<(), E>,
    ) -> Result<bool, PartialApply<E>> {
        let mut changed = false;
        let mut applied = Vec::with_capacity(writes.len());
        for write in writes {
            if let Err(error) = io(&write) {
                return Err(PartialApply {
                    applied,
                    changed,
                    error,
                });
            }
            changed |= self.commit(&write);
            applied.push(write);
        }
        Ok(changed)
    }
}
