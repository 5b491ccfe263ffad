//! Power strip connection settings.

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{OUTLETS, outlet_name};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ip9258Config {
    pub name: String,
    pub index: i32,
    /// Name of the single port holding the outlets.
    pub port: String,
    /// `host[:port]` of the strip's web server.
    pub address: String,
    pub username: String,
    pub password: String,
    /// Status polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Per request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Terminals, one per outlet in use.
    pub outlets: Vec<OutletConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutletConfig {
    pub name: String,
    pub index: i32,
    /// Outlet number on the strip, 1 to 4.
    pub outlet: u8,
}

impl Default for Ip9258Config {
    fn default() -> Self {
        Self {
            name: "myIP9258".to_string(),
            index: 0,
            port: "PS".to_string(),
            address: "192.168.10.10".to_string(),
            username: "admin".to_string(),
            password: "12345678".to_string(),
            poll_interval_ms: 3000,
            timeout_ms: 3000,
            outlets: OUTLETS
                .iter()
                .map(|outlet| OutletConfig {
                    name: outlet_name(*outlet),
                    index: i32::from(*outlet),
                    outlet: *outlet,
                })
                .collect(),
        }
    }
}

impl Ip9258Config {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Command endpoint of the strip.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}/set.cmd", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fill_missing_fields_with_factory_defaults() {
        let config: Ip9258Config = toml::from_str(r#"name = "Power""#).unwrap();
        assert_eq!(config.name, "Power");
        assert_eq!(config.port, "PS");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "12345678");
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.endpoint(), "http://192.168.10.10/set.cmd");
        assert_eq!(config.outlets.len(), 4);
        assert_eq!(config.outlets[3].name, "AC Outlet 4");
    }

    #[test]
    fn should_read_named_outlets() {
        let config: Ip9258Config = toml::from_str(
            r#"
            outlets = [
                { name = "Amplifier", index = 0, outlet = 3 },
                { name = "Rotator", index = 1, outlet = 1 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(config.outlets.len(), 2);
        assert_eq!(config.outlets[0].outlet, 3);
    }
}
