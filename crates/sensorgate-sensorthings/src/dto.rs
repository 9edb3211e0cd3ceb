//! SensorThings entity records
//!
//! Immutable value records mirroring the OGC SensorThings v1.1 wire format:
//! `@iot.id`, `@iot.selfLink`, `<Relation>@iot.navigationLink` on each
//! entity, `@iot.count`/`@iot.nextLink` on result lists. Entity ids are
//! dynamic (`serde_json::Value`) because external servers use numeric ids
//! while sensorgate mints composite strings.
//!
//! Each expandable entity carries a flattened `expansions` map; when a
//! client asked for `$expand`, the mapper stores the embedded related
//! entities there under the relation name, and serialization inlines them
//! beside the navigation links.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::geojson::GeoJson;

/// A closed time interval serialized in the ISO 8601 `start/end` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Serialize for TimeInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = format!(
            "{}/{}",
            self.start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        );
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for TimeInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let (start, end) = text
            .split_once('/')
            .ok_or_else(|| serde::de::Error::custom("expected 'start/end' interval"))?;
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        };
        Ok(TimeInterval {
            start: parse(start)?,
            end: parse(end)?,
        })
    }
}

/// One entry of the service root document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameUrl {
    pub name: String,
    pub url: String,
}

/// The service root document listing the collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootResponse {
    pub value: Vec<NameUrl>,
}

/// A collection page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultList<T> {
    #[serde(rename = "@iot.count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    #[serde(rename = "@iot.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,

    pub value: Vec<T>,
}

impl<T> ResultList<T> {
    /// A page without count or continuation.
    pub fn of(value: Vec<T>) -> Self {
        Self {
            count: None,
            next_link: None,
            value,
        }
    }
}

impl<T> Default for ResultList<T> {
    fn default() -> Self {
        Self::of(Vec::new())
    }
}

/// An entity reference carrying only the id, as returned by `$ref`
/// endpoints and accepted by association updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefId {
    #[serde(rename = "@iot.id")]
    pub id: Value,
}

impl RefId {
    pub fn new(id: impl Into<Value>) -> Self {
        Self { id: id.into() }
    }
}

/// A SensorThings Thing, backed by one twin provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Thing {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(
        rename = "Datastreams@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub datastreams_link: Option<String>,

    #[serde(
        rename = "HistoricalLocations@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub historical_locations_link: Option<String>,

    #[serde(
        rename = "Locations@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub locations_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A SensorThings Location, derived from the provider's admin location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "encodingType", default, skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoJson>,

    #[serde(
        rename = "Things@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub things_link: Option<String>,

    #[serde(
        rename = "HistoricalLocations@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub historical_locations_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A past (or present) location of a Thing at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HistoricalLocation {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(
        rename = "Locations@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub locations_link: Option<String>,

    #[serde(
        rename = "Thing@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub thing_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// The unit of measurement of a Datastream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UnitOfMeasurement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// A SensorThings Datastream, backed by one twin resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Datastream {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "observationType", default, skip_serializing_if = "Option::is_none")]
    pub observation_type: Option<String>,

    #[serde(rename = "unitOfMeasurement", default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<UnitOfMeasurement>,

    #[serde(rename = "observedArea", default, skip_serializing_if = "Option::is_none")]
    pub observed_area: Option<GeoJson>,

    #[serde(rename = "phenomenonTime", default, skip_serializing_if = "Option::is_none")]
    pub phenomenon_time: Option<TimeInterval>,

    #[serde(rename = "resultTime", default, skip_serializing_if = "Option::is_none")]
    pub result_time: Option<TimeInterval>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(
        rename = "Observations@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observations_link: Option<String>,

    #[serde(
        rename = "ObservedProperty@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observed_property_link: Option<String>,

    #[serde(
        rename = "Sensor@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sensor_link: Option<String>,

    #[serde(
        rename = "Thing@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub thing_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A SensorThings Sensor; metadata is extracted from resource annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Sensor {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "encodingType", default, skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(
        rename = "Datastreams@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub datastreams_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A SensorThings ObservedProperty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObservedProperty {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(
        rename = "Datastreams@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub datastreams_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A SensorThings Observation: the live timed value of a resource, or one
/// row of its stored time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Observation {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(rename = "phenomenonTime", default, skip_serializing_if = "Option::is_none")]
    pub phenomenon_time: Option<DateTime<Utc>>,

    #[serde(rename = "resultTime", default, skip_serializing_if = "Option::is_none")]
    pub result_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(rename = "resultQuality", default, skip_serializing_if = "Option::is_none")]
    pub result_quality: Option<Value>,

    #[serde(rename = "validTime", default, skip_serializing_if = "Option::is_none")]
    pub valid_time: Option<TimeInterval>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,

    #[serde(
        rename = "Datastream@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub datastream_link: Option<String>,

    #[serde(
        rename = "FeatureOfInterest@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub feature_of_interest_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A SensorThings FeatureOfInterest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureOfInterest {
    #[serde(rename = "@iot.selfLink", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "@iot.id", default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "encodingType", default, skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<GeoJson>,

    #[serde(
        rename = "Observations@iot.navigationLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub observations_link: Option<String>,

    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expansions: BTreeMap<String, Value>,
}

/// A Thing create/update payload with optional inline related entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExpandedThing {
    #[serde(rename = "@iot.id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(rename = "Locations", default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,

    #[serde(rename = "Datastreams", default, skip_serializing_if = "Option::is_none")]
    pub datastreams: Option<Vec<ExpandedDatastream>>,
}

/// A Datastream create/update payload with optional inline related
/// entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExpandedDatastream {
    #[serde(rename = "@iot.id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "observationType", default, skip_serializing_if = "Option::is_none")]
    pub observation_type: Option<String>,

    #[serde(rename = "unitOfMeasurement", default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<UnitOfMeasurement>,

    #[serde(rename = "phenomenonTime", default, skip_serializing_if = "Option::is_none")]
    pub phenomenon_time: Option<TimeInterval>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,

    #[serde(rename = "Thing", default, skip_serializing_if = "Option::is_none")]
    pub thing: Option<RefId>,

    #[serde(rename = "Sensor", default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<Sensor>,

    #[serde(rename = "ObservedProperty", default, skip_serializing_if = "Option::is_none")]
    pub observed_property: Option<ObservedProperty>,

    #[serde(rename = "Observations", default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<Vec<Observation>>,
}

/// A Location create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExpandedLocation {
    #[serde(rename = "@iot.id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "encodingType", default, skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoJson>,

    #[serde(rename = "Things", default, skip_serializing_if = "Option::is_none")]
    pub things: Option<Vec<RefId>>,
}

/// An Observation create/update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExpandedObservation {
    #[serde(rename = "@iot.id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(rename = "phenomenonTime", default, skip_serializing_if = "Option::is_none")]
    pub phenomenon_time: Option<DateTime<Utc>>,

    #[serde(rename = "resultTime", default, skip_serializing_if = "Option::is_none")]
    pub result_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(rename = "resultQuality", default, skip_serializing_if = "Option::is_none")]
    pub result_quality: Option<Value>,

    #[serde(rename = "validTime", default, skip_serializing_if = "Option::is_none")]
    pub valid_time: Option<TimeInterval>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,

    #[serde(rename = "Datastream", default, skip_serializing_if = "Option::is_none")]
    pub datastream: Option<RefId>,

    #[serde(rename = "FeatureOfInterest", default, skip_serializing_if = "Option::is_none")]
    pub feature_of_interest: Option<FeatureOfInterest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_thing_wire_names() {
        let thing = Thing {
            self_link: Some("https://gw/v1.1/Things(abc)".to_string()),
            id: json!("abc"),
            name: Some("Station".to_string()),
            description: Some("A station".to_string()),
            properties: None,
            datastreams_link: Some("https://gw/v1.1/Things(abc)/Datastreams".to_string()),
            historical_locations_link: None,
            locations_link: None,
            expansions: BTreeMap::new(),
        };
        let wire = serde_json::to_value(&thing).unwrap();
        assert_eq!(wire["@iot.id"], json!("abc"));
        assert_eq!(wire["@iot.selfLink"], json!("https://gw/v1.1/Things(abc)"));
        assert_eq!(
            wire["Datastreams@iot.navigationLink"],
            json!("https://gw/v1.1/Things(abc)/Datastreams")
        );
        assert!(wire.get("Locations@iot.navigationLink").is_none());
    }

    #[test]
    fn test_thing_parses_external_numeric_ids() {
        let thing: Thing = serde_json::from_value(json!({
            "@iot.id": 206047,
            "@iot.selfLink": "https://toronto-bike-snapshot.sensorup.com/v1.0/Things(206047)",
            "name": "7061:Bloor St / Brunswick Ave",
            "description": "Bloor St / Brunswick Ave bike share station",
            "properties": {},
            "Datastreams@iot.navigationLink":
                "https://toronto-bike-snapshot.sensorup.com/v1.0/Things(206047)/Datastreams"
        }))
        .unwrap();
        assert_eq!(thing.id, json!(206047));
        assert_eq!(thing.name.as_deref(), Some("7061:Bloor St / Brunswick Ave"));
    }

    #[test]
    fn test_expansions_flatten_beside_links() {
        let mut observation = Observation {
            id: json!("p~s~r~1f"),
            ..Default::default()
        };
        observation.expansions.insert(
            "Datastream".to_string(),
            json!({"@iot.id": "p~s~r", "name": "temperature"}),
        );
        let wire = serde_json::to_value(&observation).unwrap();
        assert_eq!(wire["Datastream"]["@iot.id"], json!("p~s~r"));
    }

    #[test]
    fn test_result_list_wire_names() {
        let list = ResultList {
            count: Some(199),
            next_link: Some("https://gw/v1.1/Things?$top=100&$skip=100".to_string()),
            value: vec![RefId::new("a")],
        };
        let wire = serde_json::to_value(&list).unwrap();
        assert_eq!(wire["@iot.count"], json!(199));
        assert_eq!(wire["value"][0]["@iot.id"], json!("a"));
    }

    #[test]
    fn test_time_interval_round_trip() {
        let interval = TimeInterval {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        };
        let wire = serde_json::to_value(interval).unwrap();
        assert_eq!(
            wire,
            json!("2024-01-01T00:00:00.000Z/2024-01-02T00:00:00.000Z")
        );
        let back: TimeInterval = serde_json::from_value(wire).unwrap();
        assert_eq!(back, interval);

        assert!(serde_json::from_value::<TimeInterval>(json!("not-an-interval")).is_err());
    }

    #[test]
    fn test_expanded_datastream_accepts_inline_entities() {
        let ds: ExpandedDatastream = serde_json::from_value(json!({
            "name": "temperature",
            "unitOfMeasurement": {"symbol": "°C"},
            "Sensor": {"name": "dht22", "encodingType": "text/plain"},
            "Observations": [{"result": 21.5, "phenomenonTime": "2024-01-01T00:00:00Z"}]
        }))
        .unwrap();
        assert_eq!(ds.sensor.as_ref().unwrap().name.as_deref(), Some("dht22"));
        assert_eq!(ds.observations.as_ref().unwrap().len(), 1);
    }
}
