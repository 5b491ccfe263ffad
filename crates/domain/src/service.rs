//! Naming convention for switch services on the network.
//!
//! A switch named `"Tower Yagi"` is hosted as the service
//! `shackbus.switch.Tower_Yagi` and publishes its state on
//! `shackbus.switch.Tower_Yagi.state`.

/// Namespace prefix shared by every switch service.
pub const SERVICE_PREFIX: &str = "shackbus.switch.";

/// Suffix appended to a service name to form its state topic.
const STATE_SUFFIX: &str = ".state";

/// `true` when `service` lives in the switch namespace `prefix`.
#[must_use]
pub fn is_switch_service(prefix: &str, service: &str) -> bool {
    service.contains(prefix)
}

/// Human readable switch name of a service.
///
/// Takes the last `.`-separated segment and turns `_` back into spaces.
#[must_use]
pub fn display_name(service: &str) -> String {
    service
        .rsplit('.')
        .next()
        .unwrap_or(service)
        .replace('_', " ")
}

/// Service name under which a switch called `name` is hosted.
#[must_use]
pub fn service_name(prefix: &str, name: &str) -> String {
    format!("{prefix}{}", name.replace(' ', "_"))
}

/// Pub/sub topic carrying the state snapshots of `service`.
#[must_use]
pub fn state_topic(service: &str) -> String {
    format!("{}{STATE_SUFFIX}", service.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_service_to_display_name() {
        assert_eq!(display_name("shackbus.switch.Tower_Yagi"), "Tower Yagi");
    }

    #[test]
    fn should_return_input_when_no_segment_separator() {
        assert_eq!(display_name("stack"), "stack");
    }

    #[test]
    fn should_build_service_name_from_display_name() {
        let service = service_name(SERVICE_PREFIX, "Tower Yagi");
        assert_eq!(service, "shackbus.switch.Tower_Yagi");
        assert_eq!(display_name(&service), "Tower Yagi");
    }

    #[test]
    fn should_recognise_switch_services_only() {
        assert!(is_switch_service(SERVICE_PREFIX, "shackbus.switch.Stack"));
        assert!(!is_switch_service(SERVICE_PREFIX, "shackbus.rotator.Az"));
    }

    #[test]
    fn should_derive_state_topic() {
        assert_eq!(
            state_topic("shackbus.switch.Stack"),
            "shackbus.switch.Stack.state"
        );
    }
}
