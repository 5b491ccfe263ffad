//! Common error types used across the workspace.
//!
//! Every driver, proxy and the hub report failures through [`SwitchError`].
//! The concrete error structs are serializable so the RPC layer can carry
//! them between processes without flattening them into strings.

use serde::{Deserialize, Serialize};

/// Boxed source error carried by I/O-related failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Base error type for the remoteswitch system.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// Bad request shape or unknown name; no state was changed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The requested switch, port or terminal does not exist.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// The request would violate device-level exclusivity; no state was changed.
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// The requested terminal set has no physical realization.
    #[error("unsupported combination: {0}")]
    UnknownCombination(#[from] UnknownCombinationError),

    /// A switch with the same name is already registered.
    #[error("duplicate switch: {0}")]
    DuplicateName(#[from] DuplicateNameError),

    /// Talking to the hardware or the remote service failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The component could not be constructed and never became live.
    #[error("initialisation failed: {0}")]
    Init(#[from] InitError),
}

impl SwitchError {
    /// Shorthand for a [`SwitchError::Transport`] wrapping `source`.
    pub fn transport(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport(TransportError::with_source(context, source))
    }

    /// Shorthand for a [`SwitchError::Init`] wrapping `source`.
    pub fn init(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Init(InitError::with_source(context, source))
    }
}

/// Validation failures for switch requests and configurations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("port request must contain at least one terminal")]
    NoTerminals,

    #[error("unknown port {port:?}")]
    UnknownPort { port: String },

    #[error("unknown terminal {terminal:?} on port {port:?}")]
    UnknownTerminal { port: String, terminal: String },

    #[error("port {port:?} is declared more than once")]
    DuplicatePort { port: String },

    #[error("terminal {terminal:?} is declared more than once on port {port:?}")]
    DuplicateTerminal { port: String, terminal: String },

    #[error("exclusive port {port:?} cannot activate more than one terminal")]
    MultipleActivations { port: String },

    #[error("request names {given:?} but targets {expected:?}")]
    NameMismatch { expected: String, given: String },
}

/// Returned when a named object does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind} {name:?} not found")]
pub struct NotFoundError {
    /// Kind of object (`"switch"`, `"port"`, `"terminal"`).
    pub kind: String,
    /// Name that was looked up.
    pub name: String,
}

impl NotFoundError {
    #[must_use]
    pub fn switch(name: impl Into<String>) -> Self {
        Self {
            kind: "switch".to_string(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn port(name: impl Into<String>) -> Self {
        Self {
            kind: "port".to_string(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn terminal(name: impl Into<String>) -> Self {
        Self {
            kind: "terminal".to_string(),
            name: name.into(),
        }
    }
}

/// A terminal is already active on another port of an exclusive switch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("terminal {terminal:?} in use by port {port:?}")]
pub struct ConflictError {
    pub terminal: String,
    /// Port currently holding the terminal.
    pub port: String,
}

/// No combination is declared for the requested set of active terminals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("unknown terminal combination {key:?}")]
pub struct UnknownCombinationError {
    /// Canonical key of the requested set.
    pub key: String,
}

/// A switch with this name is already registered in the hub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("switch names must be unique, {name:?} is already registered")]
pub struct DuplicateNameError {
    pub name: String,
}

/// I/O failure while talking to hardware or to a remote service.
#[derive(Debug, thiserror::Error)]
#[error("{context}")]
pub struct TransportError {
    context: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            context: context.into(),
            source: Some(source.into()),
        }
    }
}

/// Construction-time failure.
#[derive(Debug, thiserror::Error)]
#[error("{context}")]
pub struct InitError {
    context: String,
    #[source]
    source: Option<BoxError>,
}

impl InitError {
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            context: context.into(),
            source: Some(source.into()),
        }
    }
}
