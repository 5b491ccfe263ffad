//! Bandswitch: a band decoder built on a [`RelayBank`].
//!
//! Each port is one radio and each terminal a band output. Selecting a band
//! releases the radio's previous band, and a band already feeding one radio
//! cannot be taken by another.

use remoteswitch_app::event_bus::StateBus;

use crate::config::{BandswitchConfig, TerminalConfig};
use crate::error::GpioError;
use crate::pin::OutputPin;
use crate::relay_bank::RelayBank;

impl<P: OutputPin> RelayBank<P> {
    /// Build the band decoder described by `config`.
    ///
    /// # Errors
    ///
    /// Same as [`RelayBank::new`].
    pub fn bandswitch(
        config: &BandswitchConfig,
        bus: StateBus,
        open: impl FnMut(&TerminalConfig) -> Result<P, GpioError>,
    ) -> Result<Self, GpioError> {
        Self::new(&config.relay_bank(), bus, open)
    }
}
