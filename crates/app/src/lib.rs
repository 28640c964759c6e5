//! # meross-bridge-app
//!
//! Application layer: the device update pipeline and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement (driven/outbound ports):
//!   - `DeviceTransport`: send commands and status queries to a device
//!   - `HubCharacteristics`: read and push hub-visible values
//!   - `ContextStore`: persist the accessory context
//!   - `AdaptiveLighting`: query and disable the adaptive lighting curve
//!   - `EventPublisher`: publish hub events
//! - Provide the **per-device core**:
//!   - `CommandQueue`: one command at a time, FIFO, paced, time-bounded
//!   - `Debouncer`: latest write per characteristic wins
//!   - `DeviceController`: write handlers, cache, revert on failure
//!   - poll and push reconciliation, poll scheduler
//! - Provide **in-process infrastructure** that doesn't need IO
//!   (event bus, characteristic store, adaptive lighting flag)
//!
//! ## Dependency rule
//! Depends on `meross-bridge-domain` only (plus `tokio` for timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod adaptive_lighting;
pub mod cache;
pub mod characteristic_store;
pub mod command_queue;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod event_bus;
pub mod poller;
pub mod ports;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod testing;
