//! GeoJSON value model
//!
//! Twin locations and observed areas arrive as dynamic JSON; this module
//! gives them a typed shape and the extraction rules the mapper relies on.
//! The enum is internally tagged on `type`, so (de)serialization follows
//! the GeoJSON wire format directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sensorgate_common::{GatewayError, Result};

/// A single coordinate tuple.
pub type Position = Vec<f64>;

/// A GeoJSON object: any geometry, a Feature, or a FeatureCollection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJson {
    Point {
        coordinates: Position,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<GeoJson>,
    },
    Feature {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        geometry: Option<Box<GeoJson>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<Map<String, Value>>,
    },
    FeatureCollection {
        features: Vec<GeoJson>,
    },
}

impl GeoJson {
    /// A Point with empty coordinates, the stand-in for a provider that has
    /// no location when callers do not accept `None`.
    pub fn empty_point() -> Self {
        GeoJson::Point {
            coordinates: Vec::new(),
        }
    }

    /// Whether this object is a bare geometry (not a Feature or
    /// FeatureCollection).
    pub fn is_geometry(&self) -> bool {
        !matches!(self, GeoJson::Feature { .. } | GeoJson::FeatureCollection { .. })
    }
}

/// Parse a raw twin value into a GeoJSON object.
///
/// The value may be a native GeoJSON structure, a JSON string to parse, or
/// an arbitrary object converted structurally. With `allow_null` a missing
/// or unparseable string value degrades to `Ok(None)`; without it a missing
/// value becomes an empty Point and an unparseable one is a data-integrity
/// fault surfaced as an internal error.
pub fn parse_location(raw: Option<&Value>, allow_null: bool) -> Result<Option<GeoJson>> {
    let raw = match raw {
        None | Some(Value::Null) => {
            return Ok(if allow_null {
                None
            } else {
                Some(GeoJson::empty_point())
            });
        }
        Some(value) => value,
    };

    match raw {
        Value::String(text) => match serde_json::from_str::<GeoJson>(text) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) if allow_null => Ok(None),
            Err(e) => Err(GatewayError::Internal(format!(
                "Invalid resource location content: {e}"
            ))),
        },
        other => serde_json::from_value::<GeoJson>(other.clone())
            .map(Some)
            .map_err(|e| {
                GatewayError::Internal(format!("Invalid resource location content: {e}"))
            }),
    }
}

/// Derive a datastream's observed area from a location object.
///
/// A Feature contributes its geometry; a FeatureCollection the first member
/// geometry that is a Polygon. Anything that is not a Polygon in the end
/// yields `None`, never an error.
pub fn observed_area(location: &GeoJson) -> Option<GeoJson> {
    let geometry = match location {
        GeoJson::Feature { geometry, .. } => geometry.as_deref(),
        GeoJson::FeatureCollection { features } => features
            .iter()
            .filter_map(|f| match f {
                GeoJson::Feature { geometry, .. } => geometry.as_deref(),
                _ => None,
            })
            .find(|g| matches!(g, GeoJson::Polygon { .. })),
        other => Some(other),
    };
    match geometry {
        Some(polygon @ GeoJson::Polygon { .. }) => Some(polygon.clone()),
        _ => None,
    }
}

/// Collapse a FeatureCollection into at most one Feature.
///
/// Zero features yield `None`; one passes through unchanged; several are
/// combined into a synthetic GeometryCollection Feature whose id is the
/// first feature's id suffixed with `.combined`.
pub fn combine_features(features: &[GeoJson]) -> Option<GeoJson> {
    match features.len() {
        0 => None,
        1 => Some(features[0].clone()),
        _ => {
            let geometries: Vec<GeoJson> = features
                .iter()
                .filter_map(|f| match f {
                    GeoJson::Feature { geometry, .. } => geometry.as_deref().cloned(),
                    _ => None,
                })
                .collect();
            let first_id = features
                .iter()
                .find_map(|f| match f {
                    GeoJson::Feature { id, .. } => id.clone(),
                    _ => None,
                })
                .unwrap_or_default();
            Some(GeoJson::Feature {
                id: Some(format!("{first_id}.combined")),
                geometry: Some(Box::new(GeoJson::GeometryCollection { geometries })),
                properties: None,
            })
        }
    }
}

/// Look up a string property of a Feature, or of the first feature in a
/// FeatureCollection that carries it.
pub fn feature_property(location: &GeoJson, name: &str) -> Option<String> {
    match location {
        GeoJson::Feature { properties, .. } => properties
            .as_ref()
            .and_then(|p| p.get(name))
            .map(value_to_display),
        GeoJson::FeatureCollection { features } => features
            .iter()
            .find_map(|f| feature_property(f, name)),
        _ => None,
    }
}

/// Render a property value the way a display field expects it: strings as
/// themselves, everything else via its JSON form.
fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    fn polygon() -> GeoJson {
        GeoJson::Polygon {
            coordinates: vec![vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
                vec![0.0, 0.0],
            ]],
        }
    }

    fn feature(id: &str, geometry: GeoJson) -> GeoJson {
        GeoJson::Feature {
            id: Some(id.to_string()),
            geometry: Some(Box::new(geometry)),
            properties: None,
        }
    }

    #[test]
    fn test_serde_tagging_round_trip() {
        let point: GeoJson = serde_json::from_value(json!({
            "type": "Point",
            "coordinates": [5.7, 45.2]
        }))
        .unwrap();
        assert_eq!(
            point,
            GeoJson::Point {
                coordinates: vec![5.7, 45.2]
            }
        );
        let back = serde_json::to_value(&point).unwrap();
        assert_eq!(back["type"], "Point");
    }

    #[test]
    fn test_parse_location_null_policies() {
        assert_eq!(parse_location(None, true).unwrap(), None);
        assert_eq!(
            parse_location(None, false).unwrap(),
            Some(GeoJson::empty_point())
        );
        assert_eq!(parse_location(Some(&Value::Null), true).unwrap(), None);
    }

    #[test]
    fn test_parse_location_from_json_string() {
        let raw = json!("{\"type\": \"Point\", \"coordinates\": [1.0, 2.0]}");
        let parsed = parse_location(Some(&raw), false).unwrap().unwrap();
        assert!(matches!(parsed, GeoJson::Point { .. }));

        let broken = json!("not geojson at all");
        assert_eq!(parse_location(Some(&broken), true).unwrap(), None);
        assert!(matches!(
            parse_location(Some(&broken), false),
            Err(GatewayError::Internal(_))
        ));
    }

    #[test]
    fn test_parse_location_structural_conversion() {
        let raw = json!({"type": "Point", "coordinates": [1.0, 2.0]});
        let parsed = parse_location(Some(&raw), false).unwrap().unwrap();
        assert!(matches!(parsed, GeoJson::Point { .. }));

        let nonsense = json!({"latitude": 45.2});
        assert!(parse_location(Some(&nonsense), false).is_err());
    }

    #[test]
    fn test_observed_area_from_feature() {
        assert_eq!(
            observed_area(&feature("f1", polygon())),
            Some(polygon())
        );
        // a feature with a point geometry has no observed area
        assert_eq!(
            observed_area(&feature("f1", GeoJson::empty_point())),
            None
        );
    }

    #[test]
    fn test_observed_area_from_collection_picks_first_polygon() {
        let collection = GeoJson::FeatureCollection {
            features: vec![
                feature("f1", GeoJson::empty_point()),
                feature("f2", polygon()),
            ],
        };
        assert_eq!(observed_area(&collection), Some(polygon()));
    }

    #[test]
    fn test_observed_area_of_bare_point_is_none() {
        assert_eq!(observed_area(&GeoJson::empty_point()), None);
        assert_eq!(observed_area(&polygon()), Some(polygon()));
    }

    #[test]
    fn test_combine_features_boundaries() {
        assert_eq!(combine_features(&[]), None);

        let single = feature("only", polygon());
        assert_eq!(combine_features(&[single.clone()]), Some(single));

        let combined = combine_features(&[
            feature("first", polygon()),
            feature("second", GeoJson::empty_point()),
        ])
        .unwrap();
        match combined {
            GeoJson::Feature { id, geometry, .. } => {
                assert_eq!(id.as_deref(), Some("first.combined"));
                match geometry.as_deref() {
                    Some(GeoJson::GeometryCollection { geometries }) => {
                        assert_eq!(geometries.len(), 2)
                    }
                    other => panic!("expected geometry collection, got {other:?}"),
                }
            }
            other => panic!("expected feature, got {other:?}"),
        }
    }

    #[test]
    fn test_feature_property_lookup() {
        let mut props = Map::new();
        props.insert("name".to_string(), json!("Jardin de Ville"));
        let f = GeoJson::Feature {
            id: None,
            geometry: None,
            properties: Some(props),
        };
        assert_eq!(
            feature_property(&f, "name").as_deref(),
            Some("Jardin de Ville")
        );
        assert_eq!(feature_property(&f, "description"), None);
        assert_eq!(feature_property(&GeoJson::empty_point(), "name"), None);

        let collection = GeoJson::FeatureCollection {
            features: vec![GeoJson::empty_point(), f],
        };
        assert_eq!(
            feature_property(&collection, "name").as_deref(),
            Some("Jardin de Ville")
        );
    }
}
