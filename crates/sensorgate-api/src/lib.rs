//! Northbound REST binding for sensorgate
//!
//! Exposes the SensorThings v1.1 API over axum: the service root document,
//! the eight entity collections with parenthesised-id addressing
//! (`/v1.1/Things(abc)`), nested navigation, `$ref` association endpoints,
//! and the write surface. Handlers translate HTTP verbs into mapper calls
//! and twin commands; errors propagate as [`error::ApiError`] and map onto
//! status codes at the boundary.

pub mod error;
pub mod handlers;
pub mod query;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::ApiState;
