//! Router and request dispatch
//!
//! SensorThings addresses entities with parenthesised ids inside path
//! segments (`/v1.1/Things(station-1)/Datastreams`), which does not fit a
//! fixed route table; the router captures up to three segments below the
//! version prefix and dispatches on the parsed collection, relation and
//! sub-relation names.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::debug;

use sensorgate_common::GatewayError;

use crate::error::ApiResult;
use crate::handlers::{
    self, datastreams, features_of_interest, historical_locations, locations, observations,
    observed_properties, sensors, things,
};
use crate::query::{EntityRef, ODataQuery};
use crate::state::ApiState;

/// Build the northbound router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1.1", get(service_document))
        .route("/v1.1/", get(service_document))
        .route(
            "/v1.1/:entity",
            get(get_one)
                .post(post_one)
                .put(put_one)
                .patch(put_one)
                .delete(delete_one),
        )
        .route("/v1.1/:entity/:relation", get(get_two).post(post_two))
        .route(
            "/v1.1/:entity/:relation/:sub",
            get(get_three).put(put_three).delete(delete_three),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn service_document(State(state): State<ApiState>) -> ApiResult<Response> {
    handlers::service_document(&state)
}

fn note_filter(query: &ODataQuery) {
    if let Some(filter) = &query.filter {
        // expression parsing belongs to the external filter component
        debug!(%filter, "$filter carried through without a local criterion");
    }
}

async fn get_one(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Query(query): Query<ODataQuery>,
) -> ApiResult<Response> {
    note_filter(&query);
    let entity = EntityRef::parse(&entity)?;
    match (entity.collection.as_str(), entity.id.as_deref()) {
        ("Things", None) => things::list(&state, &query),
        ("Things", Some(id)) => things::get(&state, id, &query),
        ("Locations", None) => locations::list(&state, &query),
        ("Locations", Some(id)) => locations::get(&state, id, &query),
        ("HistoricalLocations", None) => historical_locations::list(&state, &query),
        ("HistoricalLocations", Some(id)) => historical_locations::get(&state, id, &query),
        ("Datastreams", None) => datastreams::list(&state, &query),
        ("Datastreams", Some(id)) => datastreams::get(&state, id, &query),
        ("Sensors", None) => sensors::list(&state, &query),
        ("Sensors", Some(id)) => sensors::get(&state, id, &query),
        ("ObservedProperties", None) => observed_properties::list(&state, &query),
        ("ObservedProperties", Some(id)) => observed_properties::get(&state, id, &query),
        ("Observations", None) => observations::list(&state, &query),
        ("Observations", Some(id)) => observations::get(&state, id, &query),
        ("FeaturesOfInterest", None) => features_of_interest::list(&state, &query),
        ("FeaturesOfInterest", Some(id)) => features_of_interest::get(&state, id, &query),
        (other, _) => Err(GatewayError::NotFound(format!("unknown collection {other}")).into()),
    }
}

async fn get_two(
    State(state): State<ApiState>,
    Path((entity, relation)): Path<(String, String)>,
    Query(query): Query<ODataQuery>,
) -> ApiResult<Response> {
    note_filter(&query);
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    match (entity.collection.as_str(), relation.as_str()) {
        ("Things", "Datastreams") => things::datastreams(&state, id, &query),
        ("Things", "Locations") => things::locations(&state, id, &query),
        ("Things", "HistoricalLocations") => things::historical_locations(&state, id, &query),
        ("Locations", "Things") => locations::things(&state, id, &query),
        ("Locations", "HistoricalLocations") => {
            locations::historical_locations(&state, id, &query)
        }
        ("HistoricalLocations", "Thing") => historical_locations::thing(&state, id, &query),
        ("HistoricalLocations", "Locations") => {
            historical_locations::locations(&state, id, &query)
        }
        ("Datastreams", "Observations") => datastreams::observations(&state, id, &query),
        ("Datastreams", "ObservedProperty") => datastreams::observed_property(&state, id, &query),
        ("Datastreams", "Sensor") => datastreams::sensor(&state, id, &query),
        ("Datastreams", "Thing") => datastreams::thing(&state, id, &query),
        ("Sensors", "Datastreams") => sensors::datastreams(&state, id, &query),
        ("ObservedProperties", "Datastreams") => {
            observed_properties::datastreams(&state, id, &query)
        }
        ("Observations", "Datastream") => observations::datastream(&state, id, &query),
        ("Observations", "FeatureOfInterest") => {
            observations::feature_of_interest(&state, id, &query)
        }
        ("FeaturesOfInterest", "Observations") => {
            features_of_interest::observations(&state, id, &query)
        }
        (collection, relation) => Err(GatewayError::NotFound(format!(
            "unknown relation {collection}/{relation}"
        ))
        .into()),
    }
}

async fn get_three(
    State(state): State<ApiState>,
    Path((entity, relation, sub)): Path<(String, String, String)>,
    Query(query): Query<ODataQuery>,
) -> ApiResult<Response> {
    note_filter(&query);
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    let collection = entity.collection.as_str();

    if sub == "$ref" {
        return match (collection, relation.as_str()) {
            ("Things", "Datastreams") => things::datastreams_ref(&state, id),
            ("Things", "Locations") => things::locations_ref(&state, id),
            ("Things", "HistoricalLocations") => things::historical_locations_ref(&state, id),
            ("Locations", "Things") => locations::things_ref(&state, id),
            ("HistoricalLocations", "Thing") => historical_locations::thing_ref(&state, id),
            ("Datastreams", rel @ ("Sensor" | "ObservedProperty" | "Thing")) => {
                datastreams::relation_ref(&state, id, rel)
            }
            ("Observations", "Datastream") => observations::datastream_ref(&state, id),
            ("Observations", "FeatureOfInterest") => {
                observations::feature_of_interest_ref(&state, id)
            }
            (collection, relation) => Err(GatewayError::NotFound(format!(
                "unknown association {collection}/{relation}"
            ))
            .into()),
        };
    }

    match (collection, relation.as_str()) {
        ("Observations", "Datastream") => {
            observations::datastream_relation(&state, id, &sub, &query)
        }
        ("Datastreams", "Thing") => {
            let thing_id = sensorgate_sensorthings::id::extract_first_id_segment(id)?.to_string();
            match sub.as_str() {
                "Datastreams" => things::datastreams(&state, &thing_id, &query),
                "Locations" => things::locations(&state, &thing_id, &query),
                "HistoricalLocations" => things::historical_locations(&state, &thing_id, &query),
                other => {
                    Err(GatewayError::NotFound(format!("unknown relation {other}")).into())
                }
            }
        }
        (collection, relation) => Err(GatewayError::NotFound(format!(
            "unknown navigation {collection}/{relation}/{sub}"
        ))
        .into()),
    }
}

async fn post_one(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let entity = EntityRef::parse(&entity)?;
    if entity.id.is_some() {
        return Err(GatewayError::BadRequest("POST addresses a collection".to_string()).into());
    }
    match entity.collection.as_str() {
        "Things" => things::create(&state, body),
        "Locations" => locations::create(&state, body),
        "Datastreams" => datastreams::create(&state, body),
        "Sensors" => sensors::create(&state, body),
        "ObservedProperties" => observed_properties::create(&state, body),
        "Observations" => observations::create(&state, body),
        "FeaturesOfInterest" => features_of_interest::create(&state, body),
        "HistoricalLocations" => historical_locations::reject_mutation(),
        other => Err(GatewayError::NotFound(format!("unknown collection {other}")).into()),
    }
}

async fn post_two(
    State(state): State<ApiState>,
    Path((entity, relation)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    match (entity.collection.as_str(), relation.as_str()) {
        ("Datastreams", "Observations") => {
            observations::create_for_datastream(&state, id, body)
        }
        (collection, relation) => Err(GatewayError::NotFound(format!(
            "cannot create below {collection}/{relation}"
        ))
        .into()),
    }
}

async fn put_one(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    match entity.collection.as_str() {
        "Things" => things::update(&state, id, body),
        "Locations" => locations::update(&state, id, body),
        "Datastreams" => datastreams::update(&state, id, body),
        "Sensors" => sensors::update(&state, id, body),
        "ObservedProperties" => observed_properties::update(&state, id, body),
        "FeaturesOfInterest" => features_of_interest::update(&state, id, body),
        "HistoricalLocations" => historical_locations::reject_mutation(),
        "Observations" => observations::reject_mutation(),
        other => Err(GatewayError::NotFound(format!("unknown collection {other}")).into()),
    }
}

async fn put_three(
    State(state): State<ApiState>,
    Path((entity, relation, sub)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    if sub != "$ref" {
        return Err(GatewayError::BadRequest("only $ref associations are writable".to_string()).into());
    }
    match (entity.collection.as_str(), relation.as_str()) {
        ("Datastreams", rel @ ("Sensor" | "ObservedProperty")) => {
            datastreams::link_ref(&state, id, rel, body)
        }
        (collection, relation) => Err(GatewayError::NotFound(format!(
            "association {collection}/{relation} is not writable"
        ))
        .into()),
    }
}

async fn delete_one(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
) -> ApiResult<Response> {
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    match entity.collection.as_str() {
        "Things" => things::delete(&state, id),
        "Locations" => locations::delete(&state, id),
        "Datastreams" => datastreams::delete(&state, id),
        "Sensors" => sensors::delete(&state, id),
        "ObservedProperties" => observed_properties::delete(&state, id),
        "FeaturesOfInterest" => features_of_interest::delete(&state, id),
        "HistoricalLocations" => historical_locations::reject_mutation(),
        "Observations" => observations::reject_mutation(),
        other => Err(GatewayError::NotFound(format!("unknown collection {other}")).into()),
    }
}

async fn delete_three(
    State(state): State<ApiState>,
    Path((entity, relation, sub)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let entity = EntityRef::parse(&entity)?;
    let id = entity.require_id()?;
    if sub != "$ref" {
        return Err(GatewayError::BadRequest("only $ref associations are deletable".to_string()).into());
    }
    match (entity.collection.as_str(), relation.as_str()) {
        ("Datastreams", rel @ ("Sensor" | "ObservedProperty")) => {
            datastreams::unlink_ref(&state, id, rel)
        }
        (collection, relation) => Err(GatewayError::NotFound(format!(
            "association {collection}/{relation} is not deletable"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    use sensorgate_core::config::ApiConfig;
    use sensorgate_core::snapshot::{
        ProviderSnapshot, ResourceSnapshot, ServiceSnapshot, TimedValue,
    };
    use sensorgate_core::{InMemoryTwin, ADMIN_SERVICE, FRIENDLY_NAME, LOCATION};

    fn live_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(123)
    }

    fn seeded_twin() -> InMemoryTwin {
        let mut admin = ServiceSnapshot::new(ADMIN_SERVICE);
        let mut friendly = ResourceSnapshot::new(FRIENDLY_NAME);
        friendly.value = Some(TimedValue::new(json!("Weather station"), live_ts()));
        let mut location = ResourceSnapshot::new(LOCATION);
        location.value = Some(TimedValue::new(
            json!({"type": "Point", "coordinates": [5.72, 45.18]}),
            live_ts(),
        ));
        admin.resources.push(friendly);
        admin.resources.push(location);

        let mut sensors = ServiceSnapshot::new("sensors");
        let mut temperature = ResourceSnapshot::new("temperature");
        temperature.metadata.insert("unit".to_string(), json!("°C"));
        temperature.value = Some(TimedValue::new(json!(21.5), live_ts()));
        sensors.resources.push(temperature);

        let mut provider = ProviderSnapshot::new("station-1");
        provider.services.push(admin);
        provider.services.push(sensors);

        let twin = InMemoryTwin::new();
        twin.insert_provider(provider);
        twin
    }

    fn test_router() -> Router {
        let twin = Arc::new(seeded_twin());
        let config = ApiConfig {
            base_url: "https://gw.example.org".to_string(),
            ..Default::default()
        };
        let state = ApiState::new(&config, twin.clone(), twin, None);
        router(state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_service_document_lists_collections() {
        let response = test_router().oneshot(get_request("/v1.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["value"].as_array().unwrap().len(), 8);
        assert_eq!(body["value"][0]["name"], json!("Things"));
        assert_eq!(
            body["value"][0]["url"],
            json!("https://gw.example.org/v1.1/Things")
        );
    }

    #[tokio::test]
    async fn test_list_and_get_things() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(get_request("/v1.1/Things"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["@iot.count"], json!(1));
        assert_eq!(body["value"][0]["@iot.id"], json!("station-1"));
        assert_eq!(body["value"][0]["name"], json!("Weather station"));

        let response = app
            .oneshot(get_request("/v1.1/Things(station-1)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["@iot.selfLink"],
            json!("https://gw.example.org/v1.1/Things(station-1)")
        );
    }

    #[tokio::test]
    async fn test_unknown_thing_is_404_and_malformed_id_is_400() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(get_request("/v1.1/Things(ghost)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(get_request("/v1.1/Things(multi~segment)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_404() {
        let response = test_router()
            .oneshot(get_request("/v1.1/Gadgets"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_datastream_navigation() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(get_request("/v1.1/Things(station-1)/Datastreams"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["value"][0]["@iot.id"],
            json!("station-1~sensors~temperature")
        );

        let response = app
            .clone()
            .oneshot(get_request(
                "/v1.1/Datastreams(station-1~sensors~temperature)/Thing",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["@iot.id"], json!("station-1"));

        let response = app
            .oneshot(get_request(
                "/v1.1/Things(station-1)/Datastreams/$ref",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["value"][0]["@iot.id"],
            json!("station-1~sensors~temperature")
        );
    }

    #[tokio::test]
    async fn test_expand_embeds_datastreams() {
        let response = test_router()
            .oneshot(get_request(
                "/v1.1/Things(station-1)?$expand=Datastreams($expand=Sensor)",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let datastream = &body["Datastreams"]["value"][0];
        assert_eq!(datastream["@iot.id"], json!("station-1~sensors~temperature"));
        assert_eq!(
            datastream["Sensor"]["@iot.id"],
            json!("station-1~sensors~temperature")
        );
    }

    #[tokio::test]
    async fn test_live_observation_and_stale_timestamp() {
        let app = test_router();
        let live_id = format!(
            "station-1~sensors~temperature~{:x}",
            live_ts().timestamp_millis()
        );
        let response = app
            .clone()
            .oneshot(get_request(&format!("/v1.1/Observations({live_id})")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], json!(21.5));

        // an older timestamp without a configured history backend
        let older_id = format!(
            "station-1~sensors~temperature~{:x}",
            live_ts().timestamp_millis() - 1000
        );
        let response = app
            .oneshot(get_request(&format!("/v1.1/Observations({older_id})")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_thing_roundtrip() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1.1/Things",
                json!({
                    "name": "new station",
                    "description": "created over REST",
                    "Datastreams": [{
                        "name": "humidity",
                        "unitOfMeasurement": {"symbol": "%"},
                        "observationType": "http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_Observation",
                        "Observations": [{"result": 40.5, "phenomenonTime": "2024-01-02T00:00:00Z"}]
                    }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(location, "https://gw.example.org/v1.1/Things(new_station)");
        let body = body_json(response).await;
        assert_eq!(body["@iot.id"], json!("new_station"));

        let response = app
            .oneshot(get_request("/v1.1/Datastreams(new_station~humidity~data)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["unitOfMeasurement"]["symbol"], json!("%"));
    }

    #[tokio::test]
    async fn test_create_thing_without_name_is_400() {
        let response = test_router()
            .oneshot(json_request(
                "POST",
                "/v1.1/Things",
                json!({"description": "nameless"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sensor_store_lifecycle() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1.1/Sensors",
                json!({"@iot.id": "dht22", "name": "DHT22", "encodingType": "text/plain"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(get_request("/v1.1/Sensors(dht22)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], json!("DHT22"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1.1/Sensors(dht22)")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request("/v1.1/Sensors(dht22)"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_twin_backed_sensor_delete_conflicts() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1.1/Sensors(station-1~sensors~temperature)")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_historical_location_is_immutable() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1.1/HistoricalLocations(station-1~0)")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_observation_create_updates_live_value() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1.1/Datastreams(station-1~sensors~temperature)/Observations",
                json!({"result": 25.0, "phenomenonTime": "2024-06-01T10:00:00Z"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["result"], json!(25.0));

        let response = app
            .oneshot(get_request(
                "/v1.1/Datastreams(station-1~sensors~temperature)/Observations",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["value"][0]["result"], json!(25.0));
    }

    #[tokio::test]
    async fn test_pagination_window() {
        let response = test_router()
            .oneshot(get_request("/v1.1/Things?$top=0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["@iot.count"], json!(1));
        assert_eq!(body["value"].as_array().unwrap().len(), 0);
        assert_eq!(
            body["@iot.nextLink"],
            json!("https://gw.example.org/v1.1/Things?$top=0&$skip=0")
        );
    }
}
