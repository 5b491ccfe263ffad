//! GPIO switch configuration.

use serde::Deserialize;

/// A relay bank: one output pin per terminal.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayBankConfig {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    /// A terminal name may be active on at most one port at a time.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    /// Only one terminal of the port may be active at a time.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub terminals: Vec<TerminalConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalConfig {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    /// Output pin, e.g. `GPIO17`.
    pub pin: String,
    /// Active-low wiring.
    #[serde(default)]
    pub inverted: bool,
}

/// A band decoder: every port is one radio picking a band output, and a band
/// can feed only one radio at a time.
#[derive(Debug, Clone, Deserialize)]
pub struct BandswitchConfig {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub ports: Vec<BandPortConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandPortConfig {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    /// One output per band, e.g. `{ name = "20m", pin = "GPIO3" }`.
    #[serde(default)]
    pub bands: Vec<TerminalConfig>,
}

impl BandswitchConfig {
    /// The equivalent relay bank: exclusive across ports and within each port.
    #[must_use]
    pub fn relay_bank(&self) -> RelayBankConfig {
        RelayBankConfig {
            name: self.name.clone(),
            index: self.index,
            exclusive: true,
            ports: self
                .ports
                .iter()
                .map(|port| PortConfig {
                    name: port.name.clone(),
                    index: port.index,
                    exclusive: true,
                    terminals: port.bands.clone(),
                })
                .collect(),
        }
    }
}

/// A stackmatch antenna combiner.
#[derive(Debug, Clone, Deserialize)]
pub struct StackmatchConfig {
    pub name: String,
    #[serde(default = "default_stackmatch_index")]
    pub index: i32,
    /// Name of the single port.
    #[serde(default = "default_stackmatch_port")]
    pub port: String,
    #[serde(default)]
    pub combinations: Vec<CombinationConfig>,
}

/// Terminals active together, and the relays realizing them.
#[derive(Debug, Clone, Deserialize)]
pub struct CombinationConfig {
    pub terminals: Vec<CombinationTerminalConfig>,
    #[serde(default)]
    pub pins: Vec<RelayConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinationTerminalConfig {
    pub name: String,
    #[serde(default)]
    pub index: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Output pin; also identifies the relay across combinations.
    pub pin: String,
    #[serde(default)]
    pub inverted: bool,
}

fn default_stackmatch_index() -> i32 {
    100
}

fn default_stackmatch_port() -> String {
    "SM".to_string()
}
