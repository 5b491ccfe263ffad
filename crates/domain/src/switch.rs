//! Switch snapshot types: [`Device`], [`Port`] and [`Terminal`].
//!
//! These are plain values. Drivers hold their own live state and hand out
//! snapshots built from it. Anything that serializes a device must go
//! through [`Device::new`] or [`Device::sort`] so ports and terminals come
//! out ordered by index.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Full snapshot of one switching unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl Device {
    /// Build a snapshot with ports and terminals sorted by index.
    #[must_use]
    pub fn new(name: impl Into<String>, index: i32, ports: Vec<Port>) -> Self {
        let mut device = Self {
            name: name.into(),
            index,
            ports,
        };
        device.sort();
        device
    }

    /// Sort ports, and the terminals of each port, ascending by index.
    ///
    /// The sort is stable, entries with equal indices keep their relative order.
    pub fn sort(&mut self) {
        self.ports.sort_by_key(|port| port.index);
        for port in &mut self.ports {
            port.sort();
        }
    }

    /// Look up a port by name.
    #[must_use]
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|port| port.name == name)
    }
}

/// A named group of terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    /// At most one terminal may be active at a time when set.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub terminals: Vec<Terminal>,
}

impl Port {
    /// Build a control request for `name` carrying the given terminal states.
    #[must_use]
    pub fn request(name: impl Into<String>, terminals: Vec<Terminal>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            exclusive: false,
            terminals,
        }
    }

    /// Sort terminals ascending by index.
    pub fn sort(&mut self) {
        self.terminals.sort_by_key(|terminal| terminal.index);
    }

    /// Look up a terminal by name.
    #[must_use]
    pub fn terminal(&self, name: &str) -> Option<&Terminal> {
        self.terminals.iter().find(|terminal| terminal.name == name)
    }

    /// Names of the terminals that are currently active.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.terminals
            .iter()
            .filter(|terminal| terminal.state)
            .map(|terminal| terminal.name.as_str())
    }

    /// Check the shape of a control request before it reaches a driver.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when the port or one of the
    /// terminals has no name, and [`ValidationError::NoTerminals`] when the
    /// request carries no terminal at all.
    pub fn validate_request(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.terminals.is_empty() {
            return Err(ValidationError::NoTerminals);
        }
        if self.terminals.iter().any(|terminal| terminal.name.is_empty()) {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }
}

/// The smallest controllable element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    pub name: String,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub state: bool,
}

impl Terminal {
    #[must_use]
    pub fn new(name: impl Into<String>, index: i32, state: bool) -> Self {
        Self {
            name: name.into(),
            index,
            state,
        }
    }

    /// A terminal entry for a control request; only name and state matter.
    #[must_use]
    pub fn request(name: impl Into<String>, state: bool) -> Self {
        Self::new(name, 0, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, index: i32, terminals: &[(&str, i32)]) -> Port {
        Port {
            name: name.to_string(),
            index,
            exclusive: false,
            terminals: terminals
                .iter()
                .map(|(name, index)| Terminal::new(*name, *index, false))
                .collect(),
        }
    }

    #[test]
    fn should_sort_ports_and_terminals_by_index() {
        let device = Device::new(
            "Tower",
            0,
            vec![
                port("B", 2, &[("z", 3), ("x", 1), ("y", 2)]),
                port("A", 1, &[("q", 9), ("p", 0)]),
            ],
        );

        let ports: Vec<_> = device.ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(ports, ["A", "B"]);
        let terminals: Vec<_> = device.ports[1]
            .terminals
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(terminals, ["x", "y", "z"]);
        assert_eq!(device.ports[0].terminals[0].name, "p");
    }

    #[test]
    fn should_emit_sorted_json() {
        let device = Device::new("Tower", 3, vec![port("B", 1, &[]), port("A", 0, &[])]);
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["ports"][0]["name"], "A");
        assert_eq!(json["ports"][1]["name"], "B");
        assert_eq!(json["index"], 3);
    }

    #[test]
    fn should_default_missing_fields_when_deserializing_request() {
        let port: Port =
            serde_json::from_str(r#"{"name":"A","terminals":[{"name":"Yagi","state":true}]}"#)
                .unwrap();
        assert!(!port.exclusive);
        assert_eq!(port.terminals[0], Terminal::new("Yagi", 0, true));
    }

    #[test]
    fn should_reject_request_without_name() {
        let request = Port::request("", vec![Terminal::request("Yagi", true)]);
        assert_eq!(request.validate_request(), Err(ValidationError::EmptyName));
    }

    #[test]
    fn should_reject_request_without_terminals() {
        let request = Port::request("A", vec![]);
        assert_eq!(
            request.validate_request(),
            Err(ValidationError::NoTerminals)
        );
    }

    #[test]
    fn should_list_active_terminals() {
        let mut p = port("A", 0, &[("x", 0), ("y", 1)]);
        p.terminals[1].state = true;
        assert_eq!(p.active().collect::<Vec<_>>(), ["y"]);
    }
}
