//! # remoteswitch-adapter-mqtt
//!
//! Moves switch traffic between processes over an MQTT broker.
//!
//! ## Responsibilities
//! - [`MqttTransport`]: the [`SwitchRpc`], [`StateBroker`] and
//!   [`ServiceRegistry`] ports used by remote proxies and discovery
//! - [`ServiceHost`]: exposes one local switch as a network service
//!
//! ## Topics
//!
//! | Topic | Retained | Payload |
//! |-------|----------|---------|
//! | `<base>/registry/<service>` | yes | announcement, empty to withdraw |
//! | `<base>/rpc/<service>` | no | [`RpcRequest`] |
//! | `<base>/reply/<client_id>` | no | [`RpcResponse`] |
//! | `<base>/<service>.state` | no | `Device` snapshot |
//!
//! ## Dependency rule
//! Same as other adapters: depends on `remoteswitch-app` and
//! `remoteswitch-domain`.
//!
//! [`SwitchRpc`]: remoteswitch_app::ports::SwitchRpc
//! [`StateBroker`]: remoteswitch_app::ports::StateBroker
//! [`ServiceRegistry`]: remoteswitch_app::ports::ServiceRegistry

pub mod config;
pub mod error;
pub mod host;
pub mod rpc;
pub mod topics;
pub mod transport;

pub use config::MqttConfig;
pub use error::MqttError;
pub use host::ServiceHost;
pub use rpc::{RpcCall, RpcFault, RpcReply, RpcRequest, RpcResponse};
pub use transport::{MqttDriver, MqttTransport};
