//! SensorThings mapping layer for sensorgate
//!
//! This crate translates between the dynamic, schemaless digital-twin
//! resource graph and the strongly-typed, link-navigable OGC SensorThings
//! entity graph: Things, Datastreams, Sensors, ObservedProperties,
//! Observations, Locations, HistoricalLocations and FeaturesOfInterest.
//!
//! The pieces:
//! - [`id`]: the `~`-joined composite id codec addressing entities that
//!   have no first-class twin object
//! - [`geojson`]: the GeoJSON value model and its extraction helpers
//! - [`dto`]: immutable SensorThings entity records with `@iot.*` wire
//!   names
//! - [`expand`]: the `$expand` settings tree deciding which relations get
//!   eagerly embedded
//! - [`mapper`]: pure snapshot-to-DTO transformation
//! - [`history`]: reconciliation of live values with stored time series
//! - [`reverse`]: DTO-to-twin update flattening for the write surface
//! - [`validate`]: per-entity required-field checks
//! - [`store`]: in-memory stores for synthetic entities created over REST

pub mod dto;
pub mod expand;
pub mod geojson;
pub mod history;
pub mod id;
pub mod mapper;
pub mod reverse;
pub mod store;
pub mod validate;

/// SensorThings API version path segment.
pub const VERSION: &str = "v1.1";

/// Default description when a provider or resource carries none.
pub const NO_DESCRIPTION: &str = "No description";
/// Default definition for observed properties without one.
pub const NO_DEFINITION: &str = "No definition";
/// Default sensor metadata when none is annotated.
pub const NO_METADATA: &str = "No metadata";
/// Default sensor encoding type.
pub const DEFAULT_ENCODING_TYPE: &str = "text/plain";
/// Encoding type of GeoJSON-valued locations and features.
pub const ENCODING_TYPE_VND_GEO_JSON: &str = "application/vnd.geo+json";
/// Fixed observation type reported for every datastream.
pub const OBSERVATION_TYPE_OM: &str =
    "http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_Observation";

/// Resource metadata keys the mapper recognises.
pub mod annotations {
    /// Unit symbol of a datastream resource.
    pub const UNIT: &str = "unit";
    /// Unit name.
    pub const UNIT_NAME: &str = "sensorthings.unit.name";
    /// Unit definition URI.
    pub const UNIT_DEFINITION: &str = "sensorthings.unit.definition";
    /// Marks a resource as holding the observed-area GeoJSON payload.
    pub const OBSERVED_AREA: &str = "sensorthings.observedArea";
    /// Observation result quality.
    pub const OBSERVATION_QUALITY: &str = "sensorthings.observation.quality";
    /// Sensor metadata payload.
    pub const SENSOR_METADATA: &str = "sensorthings.sensor.metadata";
    /// Sensor encoding type.
    pub const SENSOR_ENCODING_TYPE: &str = "sensorthings.sensor.encodingType";
    /// Observed-property definition URI.
    pub const OBSERVED_PROPERTY_DEFINITION: &str = "sensorthings.observedProperty.definition";
}
