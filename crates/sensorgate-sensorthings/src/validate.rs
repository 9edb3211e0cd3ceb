//! Required-field validation for create and update payloads
//!
//! Each entity type has a fixed set of fields a payload must carry; a miss
//! is a validation error the binding layer answers with 400, naming the
//! offending field.

use sensorgate_common::{GatewayError, Result};

use crate::dto::{
    ExpandedDatastream, ExpandedLocation, ExpandedObservation, ExpandedThing, FeatureOfInterest,
    ObservedProperty, Sensor, UnitOfMeasurement,
};

fn require<T>(field: Option<&T>, name: &str, entity: &str) -> Result<()> {
    if field.is_none() {
        return Err(GatewayError::Validation(format!(
            "{name} not found in {entity}"
        )));
    }
    Ok(())
}

pub fn validate_thing(dto: &ExpandedThing) -> Result<()> {
    require(dto.name.as_ref(), "name", "Thing")
}

pub fn validate_location(dto: &ExpandedLocation) -> Result<()> {
    require(dto.name.as_ref(), "name", "Location")?;
    require(dto.encoding_type.as_ref(), "encodingType", "Location")?;
    require(dto.location.as_ref(), "location", "Location")
}

pub fn validate_datastream(dto: &ExpandedDatastream) -> Result<()> {
    require(dto.name.as_ref(), "name", "Datastream")?;
    require(
        dto.unit_of_measurement.as_ref(),
        "unitOfMeasurement",
        "Datastream",
    )?;
    require(dto.observation_type.as_ref(), "observationType", "Datastream")
}

pub fn validate_sensor(dto: &Sensor) -> Result<()> {
    require(dto.name.as_ref(), "name", "Sensor")?;
    require(dto.encoding_type.as_ref(), "encodingType", "Sensor")
}

pub fn validate_observed_property(dto: &ObservedProperty) -> Result<()> {
    require(dto.name.as_ref(), "name", "ObservedProperty")?;
    require(dto.definition.as_ref(), "definition", "ObservedProperty")
}

pub fn validate_observation(dto: &ExpandedObservation) -> Result<()> {
    require(dto.result.as_ref(), "result", "Observation")?;
    require(dto.phenomenon_time.as_ref(), "phenomenonTime", "Observation")
}

pub fn validate_feature_of_interest(dto: &FeatureOfInterest) -> Result<()> {
    require(dto.name.as_ref(), "name", "FeatureOfInterest")?;
    require(dto.encoding_type.as_ref(), "encodingType", "FeatureOfInterest")?;
    require(dto.feature.as_ref(), "feature", "FeatureOfInterest")
}

pub fn validate_unit(unit: &UnitOfMeasurement) -> Result<()> {
    require(unit.name.as_ref(), "name", "UnitOfMeasurement")?;
    require(unit.definition.as_ref(), "definition", "UnitOfMeasurement")?;
    require(unit.symbol.as_ref(), "symbol", "UnitOfMeasurement")
}
