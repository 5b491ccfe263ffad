//! Topic layout below the configured base topic.

/// What an incoming topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming<'a> {
    /// Announcement of the given service.
    Registry(&'a str),
    /// Call addressed to the given service.
    Rpc(&'a str),
    /// Reply to one of our calls.
    Reply,
    /// Anything else, state topics included.
    Other,
}

#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn registry(&self, service: &str) -> String {
        format!("{}/registry/{service}", self.base)
    }

    /// Wildcard matching every announcement.
    #[must_use]
    pub fn registry_filter(&self) -> String {
        format!("{}/registry/+", self.base)
    }

    #[must_use]
    pub fn rpc(&self, service: &str) -> String {
        format!("{}/rpc/{service}", self.base)
    }

    #[must_use]
    pub fn reply(&self, client_id: &str) -> String {
        format!("{}/reply/{client_id}", self.base)
    }

    /// Broker topic of a state topic such as `shackbus.switch.Stack.state`.
    #[must_use]
    pub fn state(&self, topic: &str) -> String {
        format!("{}/{topic}", self.base)
    }

    #[must_use]
    pub fn classify<'a>(&self, topic: &'a str) -> Incoming<'a> {
        let Some(rest) = topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Incoming::Other;
        };
        if let Some(service) = rest.strip_prefix("registry/") {
            Incoming::Registry(service)
        } else if let Some(service) = rest.strip_prefix("rpc/") {
            Incoming::Rpc(service)
        } else if rest.starts_with("reply/") {
            Incoming::Reply
        } else {
            Incoming::Other
        }
    }
}
