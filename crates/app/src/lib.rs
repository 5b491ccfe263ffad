//! # remoteswitch-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `SwitchDevice`: the capability contract every driver and proxy fulfils
//!   - `SwitchRpc`: calls into a switch hosted by another process
//!   - `StateBroker`: subscription to a remote switch's state topic
//!   - `ServiceRegistry`: membership of switch services on the network
//! - Provide the in-process **state bus** drivers publish snapshots on
//! - Provide the **hub** (registry + fan-out to interactive clients), the
//!   **remote proxy** and the **discovery watcher** that keeps proxies alive
//!   or retires them
//!
//! ## Dependency rule
//! Depends on `remoteswitch-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod ports;
pub mod services;

#[cfg(test)]
mod testing;
