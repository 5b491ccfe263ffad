//! MQTT connection configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the MQTT transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Connect to the broker at all. Discovery and exposing local switches
    /// both need it.
    pub enabled: bool,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// MQTT client identifier, also names the RPC reply topic. Must be
    /// unique per process on the broker.
    pub client_id: String,
    /// Base topic prefix for all remoteswitch MQTT communication.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long an RPC call waits for its reply, in seconds.
    pub rpc_timeout_secs: u64,
    /// How often a hosted switch re-announces itself, in seconds.
    pub announce_interval_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            username: None,
            password: None,
            client_id: "remoteswitch".to_string(),
            base_topic: "remoteswitch".to_string(),
            keep_alive_secs: 30,
            rpc_timeout_secs: 5,
            announce_interval_secs: 10,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    #[must_use]
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }
}
