//! GPIO adapter error types.

use remoteswitch_domain::error::{InitError, SwitchError, TransportError, ValidationError};

/// Errors specific to the GPIO adapter.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    /// The pin name could not be mapped to a GPIO line.
    #[error("invalid pin name {0:?}")]
    InvalidPin(String),

    /// Reading or writing the pin failed.
    #[error("unable to drive pin {pin}")]
    Io {
        pin: String,
        #[source]
        source: std::io::Error,
    },

    /// The switch layout is inconsistent.
    #[error("invalid switch layout")]
    Layout(#[source] ValidationError),

    /// Two combinations resolve to the same terminal set.
    #[error("terminal combination {key} is declared more than once")]
    DuplicateCombination { key: String },
}

impl GpioError {
    /// Convert into a [`SwitchError`]: pin I/O is a transport failure,
    /// everything else prevents the switch from being built.
    pub fn into_domain(self) -> SwitchError {
        match self {
            Self::Io { .. } => TransportError::with_source("gpio write failed", self).into(),
            Self::Layout(err) => err.into(),
            other => InitError::with_source("invalid gpio switch", other).into(),
        }
    }
}

impl From<GpioError> for SwitchError {
    fn from(err: GpioError) -> Self {
        err.into_domain()
    }
}
