//! Events streamed to interactive clients.

use serde::{Deserialize, Serialize};

use crate::switch::Device;

/// What happened to a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubEventKind {
    Add,
    Remove,
    Update,
}

/// One change notification, as sent over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubEvent {
    #[serde(rename = "name")]
    pub kind: HubEventKind,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
}

impl HubEvent {
    #[must_use]
    pub fn add(device: Device) -> Self {
        Self {
            kind: HubEventKind::Add,
            device_name: device.name.clone(),
            device: Some(device),
        }
    }

    #[must_use]
    pub fn remove(device: Device) -> Self {
        Self {
            kind: HubEventKind::Remove,
            device_name: device.name.clone(),
            device: Some(device),
        }
    }

    #[must_use]
    pub fn update(device: Device) -> Self {
        Self {
            kind: HubEventKind::Update,
            device_name: device.name.clone(),
            device: Some(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_kind_as_name_field() {
        let event = HubEvent::update(Device::new("Stack", 0, vec![]));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "update");
        assert_eq!(json["device_name"], "Stack");
        assert_eq!(json["device"]["name"], "Stack");
    }

    #[test]
    fn should_omit_missing_device() {
        let event = HubEvent {
            kind: HubEventKind::Remove,
            device_name: "Stack".to_string(),
            device: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("device").is_none());
        assert_eq!(json["name"], "remove");
    }
}
