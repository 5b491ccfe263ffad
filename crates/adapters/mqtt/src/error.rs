//! MQTT adapter error types.

use remoteswitch_domain::error::{SwitchError, TransportError};

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to encode or parse an MQTT payload as JSON.
    #[error("failed to process MQTT payload")]
    Payload(#[source] serde_json::Error),

    /// No reply arrived in time.
    #[error("no reply from {service} within {timeout:?}")]
    Timeout {
        service: String,
        timeout: std::time::Duration,
    },

    /// The reply did not match the call.
    #[error("unexpected reply from {service}")]
    UnexpectedReply { service: String },

    /// The transport shut down while a call was pending.
    #[error("MQTT transport stopped")]
    Stopped,
}

impl MqttError {
    /// Convert into a [`SwitchError::Transport`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> SwitchError {
        TransportError::with_source("mqtt transport failure", self).into()
    }
}

impl From<MqttError> for SwitchError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
