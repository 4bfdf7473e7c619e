//! # homebus-domain
//!
//! Pure domain model for the homebus event hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Devices** keyed by (source protocol, channel) and their
//!   append-only **value histories**
//! - Define **Zones** (logical groupings such as rooms)
//! - Define the **bus vocabulary**: topics, subscription patterns, payloads
//! - Define **Rules** (triggers → script) and the **schedules** timer
//!   triggers fire on
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod bus;
pub mod device;
pub mod protocol;
pub mod rule;
pub mod schedule;
pub mod topic;
pub mod value;
pub mod zone;
