//! Remotebox adapter error types.

use remoteswitch_domain::error::{InitError, SwitchError, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum RemoteboxError {
    /// The serial device could not be opened.
    #[error("unable to open serial port {port}")]
    Serial {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// The TCP bridge could not be reached.
    #[error("unable to connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remotebox i/o failed")]
    Io(#[from] std::io::Error),

    /// The line was closed by the remote end.
    #[error("connection closed by remotebox")]
    Closed,

    #[error("no answer from remotebox within {0:?}")]
    Timeout(std::time::Duration),

    /// No successful read for too long.
    #[error("communication lost with remotebox")]
    Watchdog,

    #[error("unable to parse device info {0:?}")]
    DeviceInfo(String),

    #[error("unsupported remotebox model id {0}")]
    UnsupportedModel(u8),

    #[error("unable to parse remotebox configuration: {0}")]
    Config(String),

    #[error("invalid status message {0:?}")]
    Status(String),
}

impl RemoteboxError {
    /// Line failures are transport errors, everything that stops the
    /// handshake prevents the switch from being built.
    pub fn into_domain(self) -> SwitchError {
        match self {
            Self::Io(_) | Self::Closed | Self::Timeout(_) | Self::Watchdog => {
                TransportError::with_source("remotebox unreachable", self).into()
            }
            other => InitError::with_source("remotebox initialization failed", other).into(),
        }
    }
}

impl From<RemoteboxError> for SwitchError {
    fn from(err: RemoteboxError) -> Self {
        err.into_domain()
    }
}
