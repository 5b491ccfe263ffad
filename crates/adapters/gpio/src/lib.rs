//! # remoteswitch-adapter-gpio
//!
//! Switches whose terminals are relays wired to output pins.
//!
//! ## Provided switches
//!
//! | Switch | Behaviour |
//! |--------|-----------|
//! | [`RelayBank`] | One relay per terminal, exclusive per port and optionally per switch |
//! | [`RelayBank::bandswitch`] | Band decoder: exclusive per port and across ports |
//! | [`Stackmatch`] | Combiner: an active set resolves to a declared relay combination |
//!
//! All are generic over [`OutputPin`] so they run on Linux sysfs GPIO
//! ([`SysfsPin`]) or fully in memory ([`MemoryPin`]) for a dummy setup.
//!
//! ## Dependency rule
//!
//! Depends on `remoteswitch-app` (port traits) and `remoteswitch-domain` only.

mod bandswitch;
pub mod config;
pub mod error;
pub mod pin;
mod relay;
pub mod relay_bank;
pub mod stackmatch;

pub use config::{BandswitchConfig, RelayBankConfig, StackmatchConfig};
pub use error::GpioError;
pub use pin::{MemoryPin, OutputPin, Pin, SysfsPin};
pub use relay_bank::RelayBank;
pub use stackmatch::Stackmatch;
