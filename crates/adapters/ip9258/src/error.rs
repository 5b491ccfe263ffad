//! IP9258 adapter error types.

use remoteswitch_domain::error::{InitError, SwitchError, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Ip9258Error {
    #[error("unable to build http client")]
    Client(#[source] reqwest::Error),

    #[error("request to power strip failed")]
    Request(#[from] reqwest::Error),

    /// Anything but `200 OK`.
    #[error("power strip answered {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid power status {0:?}")]
    Parse(String),

    /// Configured outlet the strip does not have.
    #[error("power strip has no outlet {0}")]
    UnknownOutlet(u8),

    /// No successful poll for too long.
    #[error("communication lost with power strip")]
    Watchdog,

    #[error("power strip closed")]
    Closed,
}

impl Ip9258Error {
    /// A strip that does not answer is a transport problem, a broken client
    /// or an unreadable answer prevents the switch from being built.
    pub fn into_domain(self) -> SwitchError {
        match self {
            Self::Request(_) | Self::Status(_) | Self::Watchdog | Self::Closed => {
                TransportError::with_source("power strip unreachable", self).into()
            }
            other => InitError::with_source("power strip initialization failed", other).into(),
        }
    }
}

impl From<Ip9258Error> for SwitchError {
    fn from(err: Ip9258Error) -> Self {
        err.into_domain()
    }
}
