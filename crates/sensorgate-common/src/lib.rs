//! Common types for sensorgate
//!
//! This crate holds the error taxonomy shared by every sensorgate crate.
//! Errors are raised close to the point of detection and propagate
//! unmodified up to the HTTP binding layer, which maps them to status codes.

pub mod error;

pub use error::{GatewayError, Result};
