//! # remoteswitch-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **JSON API** over the hub's switches
//!   (`/api/switches`, `/api/switch/{name}/port/{port}`, …), also mounted
//!   under `/api/v1.0` for older front-ends
//! - Stream hub events to interactive clients over a **WebSocket** (`/ws`)
//! - Optionally serve a static front-end directory at `/`
//! - Map application results and [`SwitchError`](remoteswitch_domain::error::SwitchError)s
//!   into HTTP responses
//!
//! ## Dependency rule
//! Depends on `remoteswitch-app` (for the hub and port traits) and
//! `remoteswitch-domain` (for the snapshot types). Never leaks axum types
//! into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod testing;
