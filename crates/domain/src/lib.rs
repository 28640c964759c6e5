//! # meross-bridge-domain
//!
//! Pure domain model for the meross-bridge device adapter.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define **Characteristics** (hub-visible values: power, brightness, hue, …)
//! - Define **Devices** (one physical appliance, its capabilities and identity)
//! - Define the **protocol envelope** (namespaces, signed requests, responses)
//! - Define the **status digest** reported by polls and pushes
//! - Build **commands** for each characteristic family
//! - Convert between hub-domain and device-domain value ranges
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod characteristic;
pub mod command;
pub mod convert;
pub mod device;
pub mod digest;
pub mod event;
pub mod protocol;
