//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the core and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod adaptive_lighting;
pub mod context_store;
pub mod event_bus;
pub mod hub;
pub mod transport;

pub use adaptive_lighting::AdaptiveLighting;
pub use context_store::ContextStore;
pub use event_bus::EventPublisher;
pub use hub::HubCharacteristics;
pub use transport::DeviceTransport;
