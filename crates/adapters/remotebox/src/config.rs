//! Remotebox connection settings.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteboxConfig {
    pub name: String,
    pub index: i32,
    /// Serial device, used unless `address` is set.
    pub serial_port: String,
    pub baudrate: u32,
    /// `host:port` of a TCP serial bridge.
    pub address: Option<String>,
    /// Status polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RemoteboxConfig {
    fn default() -> Self {
        Self {
            name: "EA4TX Remotebox".to_string(),
            index: 0,
            serial_port: "/dev/ttyACM0".to_string(),
            baudrate: 9600,
            address: None,
            poll_interval_ms: 1000,
        }
    }
}

impl RemoteboxConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fill_missing_fields_with_defaults() {
        let config: RemoteboxConfig = toml::from_str(r#"name = "Tower""#).unwrap();
        assert_eq!(config.name, "Tower");
        assert_eq!(config.serial_port, "/dev/ttyACM0");
        assert_eq!(config.baudrate, 9600);
        assert!(config.address.is_none());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn should_read_tcp_address() {
        let config: RemoteboxConfig =
            toml::from_str(r#"address = "10.0.0.5:6000""#).unwrap();
        assert_eq!(config.address.as_deref(), Some("10.0.0.5:6000"));
    }
}
