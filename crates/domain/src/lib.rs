//! # remoteswitch-domain
//!
//! Pure domain model for the remoteswitch antenna and power switching system.
//!
//! ## Responsibilities
//! - Define **Devices**, **Ports** and **Terminals** and their index ordering
//! - Enforce the exclusivity rules every driver shares ([`bank::SwitchBank`])
//! - Canonical keys for the combiner's terminal sets ([`combination`])
//! - The naming convention that identifies switch services on the network
//! - The event payload streamed to interactive clients
//! - The error taxonomy surfaced by every driver
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;

pub mod bank;
pub mod combination;
pub mod event;
pub mod service;
pub mod switch;
