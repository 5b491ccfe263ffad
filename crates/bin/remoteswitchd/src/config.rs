//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `remoteswitch.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use remoteswitch_adapter_gpio::{BandswitchConfig, RelayBankConfig, StackmatchConfig};
use remoteswitch_adapter_ip9258::Ip9258Config;
use remoteswitch_adapter_mqtt::MqttConfig;
use remoteswitch_adapter_remotebox::RemoteboxConfig;
use remoteswitch_app::services::discovery::DiscoveryConfig;
use remoteswitch_domain::service::SERVICE_PREFIX;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Hub settings.
    pub hub: HubConfig,
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Mirroring of switches hosted by other processes.
    pub discovery: DiscoverySettings,
    /// Publishing of the local switches as network services.
    pub expose: ExposeConfig,
    /// Local switches.
    pub switches: Vec<SwitchConfig>,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Front-end assets served at `/`.
    pub static_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Events a client, or the state bus, may fall behind before losing the oldest.
    pub event_capacity: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub enabled: bool,
    /// Namespace prefix of switch services.
    pub prefix: String,
    /// Seconds without announcement after which a remote switch is dropped.
    pub ttl_secs: u64,
    /// Period of the liveness sweep in milliseconds.
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExposeConfig {
    pub enabled: bool,
}

/// One local switch, selected by its `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchConfig {
    /// Relay bank on sysfs GPIO lines.
    Relay(RelayBankConfig),
    /// Relay bank on simulated lines.
    Dummy(RelayBankConfig),
    Stackmatch(StackmatchConfig),
    /// Band decoder: one exclusive relay bank per radio.
    Bandswitch(BandswitchConfig),
    Remotebox(RemoteboxConfig),
    /// Aviosys IP9258 power strip.
    Ip9258(Ip9258Config),
}

impl SwitchConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Relay(config) | Self::Dummy(config) => &config.name,
            Self::Stackmatch(config) => &config.name,
            Self::Bandswitch(config) => &config.name,
            Self::Remotebox(config) => &config.name,
            Self::Ip9258(config) => &config.name,
        }
    }
}

impl Config {
    /// Load configuration from `remoteswitch.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result does not pass [`Config::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("remoteswitch.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("REMOTESWITCH_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("REMOTESWITCH_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("REMOTESWITCH_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("REMOTESWITCH_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("REMOTESWITCH_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("REMOTESWITCH_MQTT_PORT") {
            if let Ok(port) = val.parse() {
                self.mqtt.broker_port = port;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.hub.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "hub event capacity must be non-zero".to_string(),
            ));
        }
        if self.discovery.ttl_secs == 0 || self.discovery.sweep_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "discovery ttl and sweep interval must be non-zero".to_string(),
            ));
        }
        if (self.discovery.enabled || self.expose.enabled) && !self.mqtt.enabled {
            return Err(ConfigError::Validation(
                "discovery and expose need mqtt to be enabled".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for switch in &self.switches {
            if !names.insert(switch.name()) {
                return Err(ConfigError::Validation(format!(
                    "switch {:?} is configured more than once",
                    switch.name()
                )));
            }
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl DiscoverySettings {
    /// Settings handed to the discovery watcher.
    #[must_use]
    pub fn watcher_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            prefix: self.prefix.clone(),
            ttl: Duration::from_secs(self.ttl_secs),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7010,
            static_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "remoteswitchd=info,remoteswitch=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: SERVICE_PREFIX.to_string(),
            ttl_secs: 10,
            sweep_interval_ms: 1000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7010);
        assert!(config.server.static_dir.is_none());
        assert_eq!(config.hub.event_capacity, 256);
        assert!(!config.mqtt.enabled);
        assert!(!config.discovery.enabled);
        assert!(!config.expose.enabled);
        assert!(config.switches.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 7010);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_every_switch_type() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            static_dir = "html"

            [mqtt]
            enabled = true
            broker_host = "broker.local"
            client_id = "shack-pi"

            [discovery]
            enabled = true
            ttl_secs = 30

            [expose]
            enabled = true

            [[switches]]
            type = "relay"
            name = "Band Switch"
            exclusive = true

            [[switches.ports]]
            name = "A"
            exclusive = true
            terminals = [
                { name = "160m", index = 0, pin = "GPIO17" },
                { name = "80m", index = 1, pin = "GPIO18", inverted = true },
            ]

            [[switches]]
            type = "dummy"
            name = "Bench"

            [[switches]]
            type = "stackmatch"
            name = "Stack"

            [[switches.combinations]]
            terminals = [{ name = "Upper" }]
            pins = [{ pin = "GPIO5" }]

            [[switches]]
            type = "remotebox"
            name = "Tower"
            address = "10.0.0.5:6000"

            [[switches]]
            type = "bandswitch"
            name = "Bands"

            [[switches.ports]]
            name = "A"
            bands = [{ name = "20m", index = 0, pin = "GPIO3", inverted = true }]

            [[switches]]
            type = "ip9258"
            name = "Power"
            address = "192.168.1.20"
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.server.static_dir, Some(PathBuf::from("html")));
        assert_eq!(config.mqtt.broker_host, "broker.local");
        assert_eq!(config.discovery.watcher_config().ttl, Duration::from_secs(30));
        assert_eq!(config.switches.len(), 6);
        match &config.switches[0] {
            SwitchConfig::Relay(relay) => {
                assert!(relay.exclusive);
                assert_eq!(relay.ports[0].terminals[1].pin, "GPIO18");
                assert!(relay.ports[0].terminals[1].inverted);
            }
            other => panic!("unexpected switch {other:?}"),
        }
        assert!(matches!(
            &config.switches[1],
            SwitchConfig::Dummy(dummy) if dummy.ports.is_empty()
        ));
        match &config.switches[2] {
            SwitchConfig::Stackmatch(stack) => {
                assert_eq!(stack.port, "SM");
                assert_eq!(stack.index, 100);
                assert_eq!(stack.combinations.len(), 1);
            }
            other => panic!("unexpected switch {other:?}"),
        }
        match &config.switches[3] {
            SwitchConfig::Remotebox(remotebox) => {
                assert_eq!(remotebox.address.as_deref(), Some("10.0.0.5:6000"));
                assert_eq!(remotebox.baudrate, 9600);
            }
            other => panic!("unexpected switch {other:?}"),
        }
        match &config.switches[4] {
            SwitchConfig::Bandswitch(bands) => {
                assert_eq!(bands.ports[0].bands[0].name, "20m");
                assert!(bands.relay_bank().exclusive);
            }
            other => panic!("unexpected switch {other:?}"),
        }
        match &config.switches[5] {
            SwitchConfig::Ip9258(power) => {
                assert_eq!(power.address, "192.168.1.20");
                assert_eq!(power.port, "PS");
            }
            other => panic!("unexpected switch {other:?}"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_reject_unknown_switch_type() {
        let toml = r#"
            [[switches]]
            type = "ip9200"
            name = "Power"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 7010);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_capacity_and_intervals() {
        let mut config = Config::default();
        config.hub.event_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.sweep_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_network_features_without_mqtt() {
        let mut config = Config::default();
        config.discovery.enabled = true;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.expose.enabled = true;
        assert!(config.validate().is_err());

        config.mqtt.enabled = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_reject_duplicate_switch_names() {
        let toml = r#"
            [[switches]]
            type = "dummy"
            name = "Bench"

            [[switches]]
            type = "remotebox"
            name = "Bench"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Bench"));
    }

    #[test]
    fn should_format_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:7010");
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
