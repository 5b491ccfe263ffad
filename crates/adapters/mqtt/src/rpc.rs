//! RPC wire format.
//!
//! Requests and replies are JSON. Failures travel as an [`RpcFault`] that
//! keeps the error kind, so the caller re-raises the same [`SwitchError`]
//! variant the remote switch produced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use remoteswitch_domain::error::{
    ConflictError, DuplicateNameError, InitError, NotFoundError, SwitchError, TransportError,
    UnknownCombinationError, ValidationError,
};
use remoteswitch_domain::switch::{Device, Port};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RpcCall {
    GetDevice,
    GetPort { port: String },
    SetPort { request: Port },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: Uuid,
    /// Topic the reply must be published on.
    pub reply_to: String,
    pub call: RpcCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcReply {
    Device(Device),
    Port(Port),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Uuid,
    pub result: Result<RpcReply, RpcFault>,
}

/// A [`SwitchError`] in transit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RpcFault {
    Validation(ValidationError),
    NotFound(NotFoundError),
    Conflict(ConflictError),
    UnknownCombination(UnknownCombinationError),
    DuplicateName(DuplicateNameError),
    Transport { message: String },
    Init { message: String },
}

impl From<&SwitchError> for RpcFault {
    fn from(err: &SwitchError) -> Self {
        match err {
            SwitchError::Validation(err) => Self::Validation(err.clone()),
            SwitchError::NotFound(err) => Self::NotFound(err.clone()),
            SwitchError::Conflict(err) => Self::Conflict(err.clone()),
            SwitchError::UnknownCombination(err) => Self::UnknownCombination(err.clone()),
            SwitchError::DuplicateName(err) => Self::DuplicateName(err.clone()),
            SwitchError::Transport(err) => Self::Transport {
                message: err.to_string(),
            },
            SwitchError::Init(err) => Self::Init {
                message: err.to_string(),
            },
        }
    }
}

impl RpcFault {
    pub fn into_domain(self) -> SwitchError {
        match self {
            Self::Validation(err) => err.into(),
            Self::NotFound(err) => err.into(),
            Self::Conflict(err) => err.into(),
            Self::UnknownCombination(err) => err.into(),
            Self::DuplicateName(err) => err.into(),
            Self::Transport { message } => TransportError::new(format!("remote: {message}")).into(),
            Self::Init { message } => InitError::new(format!("remote: {message}")).into(),
        }
    }
}

/// Retained payload announcing a hosted switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub name: String,
    pub host: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use remoteswitch_domain::switch::Terminal;

    #[test]
    fn should_encode_call_with_method_tag() {
        let request = RpcRequest {
            id: Uuid::nil(),
            reply_to: "remoteswitch/reply/pi".to_string(),
            call: RpcCall::GetPort {
                port: "A".to_string(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["call"]["method"], "get_port");
        assert_eq!(json["call"]["params"]["port"], "A");
    }

    #[test]
    fn should_carry_conflict_across_the_wire() {
        let err = SwitchError::Conflict(ConflictError {
            terminal: "Yagi".to_string(),
            port: "B".to_string(),
        });
        let response = RpcResponse {
            id: Uuid::new_v4(),
            result: Err(RpcFault::from(&err)),
        };

        let json = serde_json::to_string(&response).unwrap();
        let back: RpcResponse = serde_json::from_str(&json).unwrap();

        let Err(fault) = back.result else {
            panic!("expected a fault");
        };
        match fault.into_domain() {
            SwitchError::Conflict(conflict) => assert_eq!(conflict.terminal, "Yagi"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn should_keep_transport_message() {
        let err = SwitchError::Transport(TransportError::new("gpio write failed"));
        let fault = RpcFault::from(&err);
        assert_eq!(
            fault,
            RpcFault::Transport {
                message: "gpio write failed".to_string()
            }
        );
        assert!(matches!(fault.into_domain(), SwitchError::Transport(_)));
    }

    #[test]
    fn should_encode_set_port_request() {
        let call = RpcCall::SetPort {
            request: Port::request("A", vec![Terminal::request("Yagi", true)]),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["method"], "set_port");
        assert_eq!(json["params"]["request"]["terminals"][0]["name"], "Yagi");
    }
}
