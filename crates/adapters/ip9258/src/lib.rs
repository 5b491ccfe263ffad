//! # remoteswitch-adapter-ip9258
//!
//! Driver for the Aviosys IP9258 power strip, controlled over its built-in
//! web server.
//!
//! The strip appears as a switch with a single non-exclusive port whose
//! terminals are the configured AC outlets, all four by default.
//! [`PowerStrip::open`] reads the outlet states once before anything else
//! runs, then a background task polls `set.cmd?cmd=getpower` and publishes a
//! snapshot whenever an outlet changed.
//! When no poll succeeded for five intervals the error is delivered on the
//! [`Failure`] channel and the driver closes itself.

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;

pub use config::{Ip9258Config, OutletConfig};
pub use device::{Failure, PowerStrip};
pub use error::Ip9258Error;
