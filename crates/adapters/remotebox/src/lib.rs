//! # remoteswitch-adapter-remotebox
//!
//! Driver for the EA4TX Remotebox antenna switches, reached over a serial
//! line or a TCP bridge.
//!
//! ## Lifecycle
//!
//! 1. [`Remotebox::open`] connects and runs the handshake: device info
//!    (`O`) selects the [`Model`], the configuration dump (`FI`) provides the
//!    antenna names shown on the box's display.
//! 2. A background task polls the status (`S`) at the configured interval
//!    and publishes a snapshot whenever a status line changes a terminal.
//! 3. When nothing was read for five poll intervals, or the line fails, the
//!    error is delivered on the [`Failure`] channel and the driver closes
//!    itself.
//!
//! Control requests are written as `<port>R<terminal>1` commands; the box
//! reports the resulting state through the next poll.

pub mod config;
pub mod device;
pub mod error;
pub mod model;
pub mod protocol;

pub use config::RemoteboxConfig;
pub use device::{Failure, Remotebox};
pub use error::RemoteboxError;
pub use model::Model;
