//! Test doubles for the handler tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::bank::SwitchBank;
use remoteswitch_domain::error::{SwitchError, TransportError};
use remoteswitch_domain::switch::{Device, Port, Terminal};

/// In-memory switch: exclusive port `A` with terminals `Yagi` and `Dipole`,
/// plus a non-exclusive port `B` with `Amp`.
pub struct StubSwitch {
    name: String,
    bank: Mutex<SwitchBank>,
    offline: AtomicBool,
}

impl StubSwitch {
    pub fn new(name: &str) -> Self {
        let ports = vec![
            Port {
                name: "A".to_string(),
                index: 0,
                exclusive: true,
                terminals: vec![
                    Terminal::new("Yagi", 0, false),
                    Terminal::new("Dipole", 1, false),
                ],
            },
            Port {
                name: "B".to_string(),
                index: 1,
                exclusive: false,
                terminals: vec![Terminal::new("Amp", 0, false)],
            },
        ];
        Self {
            name: name.to_string(),
            bank: Mutex::new(SwitchBank::new(name, 0, false, ports).unwrap()),
            offline: AtomicBool::new(false),
        }
    }

    /// Make every following write fail as if the hardware vanished.
    pub fn unplug(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn bank(&self) -> MutexGuard<'_, SwitchBank> {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SwitchDevice for StubSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_port(&self, name: &str) -> Result<Port, SwitchError> {
        Ok(self.bank().port(name)?)
    }

    async fn set_port(&self, request: Port) -> Result<(), SwitchError> {
        let offline = self.offline.load(Ordering::SeqCst);
        let mut bank = self.bank();
        let writes = bank.plan(&request)?;
        bank.execute(writes, |_| {
            if offline {
                Err(TransportError::new("relay board unplugged"))
            } else {
                Ok(())
            }
        })
        .map_err(|partial| partial.error)?;
        Ok(())
    }

    fn serialize(&self) -> Device {
        self.bank().snapshot()
    }

    fn close(&self) {}
}
