//! DTO-to-twin reverse mapping
//!
//! Create and update payloads arrive as SensorThings entities with inline
//! related entities; the twin consumes flat provider/resource updates. This
//! module flattens one into the other. Related-entity fields land in
//! resource metadata under `sensorthings.*` keys, which is exactly where
//! the forward mapper reads them back from.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use sensorgate_core::twin::{ProviderUpdate, ResourceUpdate};
use sensorgate_core::{DESCRIPTION, FRIENDLY_NAME};

use crate::annotations;
use crate::dto::{ExpandedDatastream, ExpandedThing, Location};
use crate::geojson::{self, GeoJson};

/// Resource name under which a created datastream's value lives; its
/// service carries the sanitized datastream name, so the composite id reads
/// `provider~datastreamName~data`.
pub const DATASTREAM_RESOURCE: &str = "data";

/// Replace every character outside `[0-9a-zA-Z._-]` with `_`, making an
/// arbitrary display name safe as a twin provider/service name.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flattened twin-side rendition of one datastream payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatastreamUpdate {
    pub provider_id: String,
    pub service_name: String,

    /// The id the client supplied, if any
    pub external_id: Option<Value>,

    pub name: Option<String>,
    pub description: Option<String>,

    /// First inline observation's result, the new live value
    pub observation: Option<Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub observation_parameters: Option<Map<String, Value>>,

    pub unit: Option<String>,
    pub unit_metadata: Option<Map<String, Value>>,

    pub sensor: Option<String>,
    pub sensor_metadata: Option<Map<String, Value>>,

    pub observed_property: Option<String>,
    pub observed_property_metadata: Option<Map<String, Value>>,
}

/// Flattened twin-side rendition of one thing payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingUpdate {
    pub provider_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<GeoJson>,
    pub external_id: Option<Value>,
    pub properties: Map<String, Value>,
}

/// One element of the update stream a create/update request unfolds into.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorThingsUpdate {
    Thing(ThingUpdate),
    Datastream(DatastreamUpdate),
}

/// Flatten a datastream payload for the given provider.
///
/// Absent related entities simply leave their field group unset; a payload
/// without a sensor yields all sensor fields `None`.
pub fn to_datastream_update(provider_id: &str, ds: &ExpandedDatastream) -> DatastreamUpdate {
    let service_name = sanitize_id(
        &ds.name
            .clone()
            .or_else(|| ds.id.as_ref().map(display))
            .unwrap_or_default(),
    );
    let mut timestamp = ds.phenomenon_time.map(|interval| interval.start);

    let (observation, observation_parameters) = match ds.observations.as_deref() {
        None | Some([]) => (None, None),
        Some([first, ..]) => {
            if first.phenomenon_time.is_some() {
                timestamp = first.phenomenon_time;
            }
            let mut parameters = Map::new();
            parameters.insert(
                "sensorthings.observation.id".to_string(),
                Value::String(display(&first.id)),
            );
            parameters.insert(
                "sensorthings.observation.resultQuality".to_string(),
                first.result_quality.clone().unwrap_or(Value::Null),
            );
            if let Some(extra) = &first.parameters {
                for (key, value) in extra {
                    parameters.insert(
                        format!("sensorthings.observation.parameters.{key}"),
                        value.clone(),
                    );
                }
            }
            (first.result.clone(), Some(parameters))
        }
    };

    let (unit, unit_metadata) = match &ds.unit_of_measurement {
        None => (None, None),
        Some(unit) => {
            let mut metadata = Map::new();
            metadata.insert(
                annotations::UNIT_NAME.to_string(),
                unit.name.clone().map(Value::String).unwrap_or(Value::Null),
            );
            metadata.insert(
                annotations::UNIT_DEFINITION.to_string(),
                unit.definition
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            (unit.symbol.clone(), Some(metadata))
        }
    };

    let (sensor, sensor_metadata) = match &ds.sensor {
        None => (None, None),
        Some(sensor) => {
            let mut metadata = Map::new();
            metadata.insert(
                "sensorthings.sensor.name".to_string(),
                sensor.name.clone().map(Value::String).unwrap_or(Value::Null),
            );
            metadata.insert(
                "sensorthings.sensor.description".to_string(),
                sensor
                    .description
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            metadata.insert(
                annotations::SENSOR_METADATA.to_string(),
                sensor.metadata.clone().unwrap_or(Value::Null),
            );
            metadata.insert(
                annotations::SENSOR_ENCODING_TYPE.to_string(),
                sensor
                    .encoding_type
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            if let Some(properties) = &sensor.properties {
                for (key, value) in properties {
                    metadata.insert(format!("sensorthings.sensor.properties.{key}"), value.clone());
                }
            }
            (Some(display(&sensor.id)), Some(metadata))
        }
    };

    let (observed_property, observed_property_metadata) = match &ds.observed_property {
        None => (None, None),
        Some(op) => {
            let mut metadata = Map::new();
            metadata.insert(
                "sensorthings.observedProperty.name".to_string(),
                op.name.clone().map(Value::String).unwrap_or(Value::Null),
            );
            metadata.insert(
                "sensorthings.observedProperty.description".to_string(),
                op.description
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            metadata.insert(
                annotations::OBSERVED_PROPERTY_DEFINITION.to_string(),
                op.definition
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            if let Some(properties) = &op.properties {
                for (key, value) in properties {
                    metadata.insert(
                        format!("sensorthings.observedProperty.properties.{key}"),
                        value.clone(),
                    );
                }
            }
            (Some(display(&op.id)), Some(metadata))
        }
    };

    DatastreamUpdate {
        provider_id: provider_id.to_string(),
        service_name,
        external_id: ds.id.clone(),
        name: ds.name.clone(),
        description: ds.description.clone(),
        observation,
        timestamp,
        observation_parameters,
        unit,
        unit_metadata,
        sensor,
        sensor_metadata,
        observed_property,
        observed_property_metadata,
    }
}

/// Unfold a thing payload into its provider update followed by one
/// datastream update per inline datastream.
pub fn to_thing_updates(thing: &ExpandedThing) -> Vec<SensorThingsUpdate> {
    let provider_id = sanitize_id(
        &thing
            .name
            .clone()
            .or_else(|| thing.id.as_ref().map(display))
            .unwrap_or_default(),
    );

    let location = thing
        .locations
        .as_deref()
        .and_then(aggregate_locations);

    let properties = thing
        .properties
        .as_ref()
        .map(|props| {
            props
                .iter()
                .map(|(k, v)| (format!("sensorthings.thing.{k}"), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    let mut updates = vec![SensorThingsUpdate::Thing(ThingUpdate {
        provider_id: provider_id.clone(),
        name: thing.name.clone(),
        description: thing.description.clone(),
        location,
        external_id: thing.id.clone(),
        properties,
    })];

    if let Some(datastreams) = &thing.datastreams {
        updates.extend(
            datastreams
                .iter()
                .map(|ds| SensorThingsUpdate::Datastream(to_datastream_update(&provider_id, ds))),
        );
    }
    updates
}

/// Combine the locations of a thing payload into one GeoJSON object: none
/// yields nothing, one becomes a Feature, several a FeatureCollection.
pub fn aggregate_locations(locations: &[Location]) -> Option<GeoJson> {
    match locations.len() {
        0 => None,
        1 => location_feature(&locations[0]),
        _ => Some(GeoJson::FeatureCollection {
            features: locations.iter().filter_map(location_feature).collect(),
        }),
    }
}

/// Render one Location as a Feature carrying its name and description as
/// `sensorthings.location.*` properties.
pub fn location_feature(location: &Location) -> Option<GeoJson> {
    let geo = location.location.as_ref()?;
    match geo {
        GeoJson::Feature { .. } => Some(geo.clone()),
        GeoJson::FeatureCollection { features } => geojson::combine_features(features),
        geometry => {
            let mut properties = Map::new();
            if let Some(name) = &location.name {
                properties.insert(
                    "sensorthings.location.name".to_string(),
                    Value::String(name.clone()),
                );
            }
            if let Some(description) = &location.description {
                properties.insert(
                    "sensorthings.location.description".to_string(),
                    Value::String(description.clone()),
                );
            }
            Some(GeoJson::Feature {
                id: Some(sanitize_id(&display(&location.id))),
                geometry: Some(Box::new(geometry.clone())),
                properties: Some(properties),
            })
        }
    }
}

impl ThingUpdate {
    /// The twin-side provider update this thing payload amounts to.
    pub fn into_provider_update(self) -> ProviderUpdate {
        let mut properties = self.properties;
        if let Some(external_id) = self.external_id {
            properties.insert("sensorthings.thing.externalId".to_string(), external_id);
        }
        ProviderUpdate {
            provider_id: self.provider_id,
            friendly_name: self.name,
            description: self.description,
            location: self
                .location
                .as_ref()
                .and_then(|geo| serde_json::to_value(geo).ok()),
            properties,
        }
    }
}

impl DatastreamUpdate {
    /// The twin-side resource update this datastream payload amounts to.
    /// All related-entity metadata groups merge into the resource metadata.
    pub fn into_resource_update(self) -> ResourceUpdate {
        let mut metadata = Map::new();
        if let Some(name) = &self.name {
            metadata.insert(FRIENDLY_NAME.to_string(), Value::String(name.clone()));
        }
        if let Some(description) = &self.description {
            metadata.insert(DESCRIPTION.to_string(), Value::String(description.clone()));
        }
        if let Some(unit) = &self.unit {
            metadata.insert(annotations::UNIT.to_string(), Value::String(unit.clone()));
        }
        for group in [
            &self.unit_metadata,
            &self.sensor_metadata,
            &self.observed_property_metadata,
            &self.observation_parameters,
        ] {
            if let Some(group) = group {
                for (key, value) in group {
                    metadata.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(sensor) = &self.sensor {
            metadata.insert(
                "sensorthings.sensor.id".to_string(),
                Value::String(sensor.clone()),
            );
        }
        if let Some(observed_property) = &self.observed_property {
            metadata.insert(
                "sensorthings.observedProperty.id".to_string(),
                Value::String(observed_property.clone()),
            );
        }

        ResourceUpdate {
            provider: self.provider_id,
            service: self.service_name,
            resource: DATASTREAM_RESOURCE.to_string(),
            value: self.observation,
            timestamp: self.timestamp,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{Observation, Sensor, UnitOfMeasurement};
    use chrono::TimeZone;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("plain-name_1.2"), "plain-name_1.2");
        assert_eq!(sanitize_id("has spaces & symbols!"), "has_spaces___symbols_");
        assert_eq!(sanitize_id("provider~id"), "provider_id");
    }

    #[test]
    fn test_null_sensor_leaves_sensor_fields_unset() {
        let ds = ExpandedDatastream {
            name: Some("temperature".to_string()),
            ..Default::default()
        };
        let update = to_datastream_update("station-1", &ds);
        assert_eq!(update.sensor, None);
        assert_eq!(update.sensor_metadata, None);
        assert_eq!(update.observed_property, None);
        assert_eq!(update.observed_property_metadata, None);
        assert_eq!(update.service_name, "temperature");
    }

    #[test]
    fn test_first_observation_becomes_live_value() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ds = ExpandedDatastream {
            name: Some("temperature".to_string()),
            observations: Some(vec![
                Observation {
                    id: json!("obs-1"),
                    result: Some(json!(21.5)),
                    phenomenon_time: Some(at),
                    result_quality: Some(json!("good")),
                    ..Default::default()
                },
                Observation {
                    id: json!("obs-2"),
                    result: Some(json!(22.0)),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let update = to_datastream_update("station-1", &ds);
        assert_eq!(update.observation, Some(json!(21.5)));
        assert_eq!(update.timestamp, Some(at));
        let parameters = update.observation_parameters.unwrap();
        assert_eq!(parameters["sensorthings.observation.id"], json!("obs-1"));
        assert_eq!(
            parameters["sensorthings.observation.resultQuality"],
            json!("good")
        );
    }

    #[test]
    fn test_sensor_and_unit_flattening() {
        let ds = ExpandedDatastream {
            name: Some("temperature".to_string()),
            unit_of_measurement: Some(UnitOfMeasurement {
                name: Some("Celsius".to_string()),
                symbol: Some("°C".to_string()),
                definition: None,
            }),
            sensor: Some(Sensor {
                id: json!("dht22"),
                name: Some("DHT22".to_string()),
                encoding_type: Some("text/plain".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let update = to_datastream_update("station-1", &ds);
        assert_eq!(update.unit.as_deref(), Some("°C"));
        let unit_metadata = update.unit_metadata.unwrap();
        assert_eq!(unit_metadata[annotations::UNIT_NAME], json!("Celsius"));
        assert_eq!(unit_metadata[annotations::UNIT_DEFINITION], Value::Null);

        assert_eq!(update.sensor.as_deref(), Some("dht22"));
        let sensor_metadata = update.sensor_metadata.unwrap();
        assert_eq!(sensor_metadata["sensorthings.sensor.name"], json!("DHT22"));
        assert_eq!(
            sensor_metadata[annotations::SENSOR_ENCODING_TYPE],
            json!("text/plain")
        );
    }

    #[test]
    fn test_thing_updates_unfold_datastreams() {
        let thing = ExpandedThing {
            name: Some("Weather station".to_string()),
            description: Some("On the roof".to_string()),
            datastreams: Some(vec![
                ExpandedDatastream {
                    name: Some("temperature".to_string()),
                    ..Default::default()
                },
                ExpandedDatastream {
                    name: Some("humidity".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let updates = to_thing_updates(&thing);
        assert_eq!(updates.len(), 3);
        match &updates[0] {
            SensorThingsUpdate::Thing(update) => {
                assert_eq!(update.provider_id, "Weather_station");
            }
            other => panic!("expected thing update first, got {other:?}"),
        }
        match &updates[2] {
            SensorThingsUpdate::Datastream(update) => {
                assert_eq!(update.provider_id, "Weather_station");
                assert_eq!(update.service_name, "humidity");
            }
            other => panic!("expected datastream update, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_locations_boundaries() {
        assert_eq!(aggregate_locations(&[]), None);

        let point_location = Location {
            id: json!("loc-1"),
            name: Some("Roof".to_string()),
            location: Some(GeoJson::Point {
                coordinates: vec![5.7, 45.2],
            }),
            ..Default::default()
        };
        match aggregate_locations(std::slice::from_ref(&point_location)).unwrap() {
            GeoJson::Feature { id, properties, .. } => {
                assert_eq!(id.as_deref(), Some("loc-1"));
                assert_eq!(
                    properties.unwrap()["sensorthings.location.name"],
                    json!("Roof")
                );
            }
            other => panic!("expected feature, got {other:?}"),
        }

        let two = vec![point_location.clone(), point_location];
        assert!(matches!(
            aggregate_locations(&two).unwrap(),
            GeoJson::FeatureCollection { .. }
        ));
    }

    #[test]
    fn test_resource_update_round_trips_metadata_keys() {
        let ds = ExpandedDatastream {
            name: Some("temperature".to_string()),
            description: Some("Outside temperature".to_string()),
            unit_of_measurement: Some(UnitOfMeasurement {
                symbol: Some("°C".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resource_update = to_datastream_update("station-1", &ds).into_resource_update();
        assert_eq!(resource_update.provider, "station-1");
        assert_eq!(resource_update.service, "temperature");
        assert_eq!(resource_update.resource, DATASTREAM_RESOURCE);
        assert_eq!(resource_update.metadata[FRIENDLY_NAME], json!("temperature"));
        assert_eq!(resource_update.metadata[annotations::UNIT], json!("°C"));
    }
}
