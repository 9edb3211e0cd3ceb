//! Core model for sensorgate
//!
//! This crate defines the digital-twin read model consumed by the
//! SensorThings mapping layer: point-in-time snapshots of providers,
//! services and resources with their timed values, the session and
//! data-update abstractions over the twin, the history query interface,
//! and the gateway configuration.
//!
//! Snapshots are plain owned values. A request takes a snapshot once and
//! maps from it; nothing in this crate is mutated during mapping.

pub mod config;
pub mod history;
pub mod snapshot;
pub mod twin;

pub use config::GatewayConfig;
pub use history::{HistoryProvider, InMemoryHistory};
pub use snapshot::{ProviderSnapshot, ResourceRef, ResourceSnapshot, ServiceSnapshot, TimedValue};
pub use twin::{DataUpdate, InMemoryTwin, ProviderUpdate, ResourceUpdate, TwinSession};

/// Name of the built-in administrative service every provider carries.
pub const ADMIN_SERVICE: &str = "admin";
/// Admin resource holding the provider's display name.
pub const FRIENDLY_NAME: &str = "friendlyName";
/// Admin resource holding the provider's description.
pub const DESCRIPTION: &str = "description";
/// Admin resource holding the provider's GeoJSON location.
pub const LOCATION: &str = "location";
