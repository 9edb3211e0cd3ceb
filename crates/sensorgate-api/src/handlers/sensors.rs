//! `/Sensors` handlers
//!
//! Twin-backed sensors share the datastream id space; store-backed sensors
//! were created over REST and live in the injected store until linked to a
//! datastream. Deleting a twin-backed sensor is a conflict because the
//! datastream still references it.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use sensorgate_common::GatewayError;
use sensorgate_sensorthings::dto::Sensor;
use sensorgate_sensorthings::store::DtoStore;
use sensorgate_sensorthings::{mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, no_content, payload, resource_target};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut sensors = Vec::new();
    for provider in state.session.list_providers() {
        for rref in mapper::datastream_refs(&provider) {
            sensors.push(mapper::to_sensor(ctx, &expansions, rref)?);
        }
    }
    sensors.extend(state.sensors.values());
    let list = paginate(
        sensors,
        query.page(state.limits.page_size),
        &state.links.collection("Sensors"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, sensor_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    if let Some(stored) = state.sensors.get(sensor_id) {
        return Ok(Json(stored).into_response());
    }
    let (provider, service, resource) = resource_target(state, sensor_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let sensor = mapper::to_sensor(state.mapper(), &query.expansions()?, rref)?;
    Ok(Json(sensor).into_response())
}

pub fn datastreams(state: &ApiState, sensor_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    if state.sensors.get(sensor_id).is_some() {
        // not linked yet, so there is nothing to navigate to
        return Ok(Json(sensorgate_sensorthings::dto::ResultList::<
            sensorgate_sensorthings::dto::Datastream,
        >::default())
        .into_response());
    }
    let (provider, _, _) = resource_target(state, sensor_id)?;
    let list = mapper::provider_datastreams(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(list).into_response())
}

pub fn create(state: &ApiState, body: Value) -> ApiResult<Response> {
    let sensor: Sensor = payload(body)?;
    validate::validate_sensor(&sensor)?;

    let sensor_id = match &sensor.id {
        Value::Null => Uuid::new_v4().to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let self_link = state.links.entity("Sensors", &sensor_id);
    let stored = Sensor {
        id: Value::String(sensor_id.clone()),
        datastreams_link: Some(state.links.relation(&self_link, "Datastreams")),
        self_link: Some(self_link.clone()),
        ..sensor
    };
    state.sensors.insert(&sensor_id, stored.clone());
    created(&self_link, stored)
}

pub fn update(state: &ApiState, sensor_id: &str, body: Value) -> ApiResult<Response> {
    let sensor: Sensor = payload(body)?;
    validate::validate_sensor(&sensor)?;
    if state.sensors.get(sensor_id).is_none() {
        return Err(
            GatewayError::Conflict("twin-backed sensors are updated via their datastream".to_string())
                .into(),
        );
    }
    let self_link = state.links.entity("Sensors", sensor_id);
    let stored = Sensor {
        id: Value::String(sensor_id.to_string()),
        datastreams_link: Some(state.links.relation(&self_link, "Datastreams")),
        self_link: Some(self_link),
        ..sensor
    };
    state.sensors.insert(sensor_id, stored.clone());
    Ok(Json(stored).into_response())
}

pub fn delete(state: &ApiState, sensor_id: &str) -> ApiResult<Response> {
    if state.sensors.remove(sensor_id).is_some() {
        return no_content();
    }
    if resource_target(state, sensor_id).is_ok() {
        return Err(
            GatewayError::Conflict("sensor is linked to a datastream".to_string()).into(),
        );
    }
    Err(GatewayError::NotFound(format!("unknown sensor {sensor_id}")).into())
}
