//! `/Datastreams` handlers
//!
//! A datastream is one twin resource addressed as
//! `provider~service~resource`. The `$ref` endpoints below `Sensor` and
//! `ObservedProperty` are where store-backed synthetic entities get linked
//! onto the resource: linking merges their `sensorthings.*` metadata into
//! the resource, which is where the forward mapper reads them from.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use sensorgate_common::GatewayError;
use sensorgate_sensorthings::dto::{ExpandedDatastream, RefId};
use sensorgate_sensorthings::expand::ExpansionSettings;
use sensorgate_sensorthings::reverse::{self, DATASTREAM_RESOURCE};
use sensorgate_sensorthings::store::DtoStore;
use sensorgate_sensorthings::{annotations, history, id, mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, no_content, payload, provider_or_404, ref_list, resource_target};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut streams = Vec::new();
    for provider in state.session.list_providers() {
        streams.extend(mapper::provider_datastreams(ctx, &expansions, &provider)?.value);
    }
    let list = paginate(
        streams,
        query.page(state.limits.page_size),
        &state.links.collection("Datastreams"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, datastream_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let datastream = mapper::to_datastream(state.mapper(), &query.expansions()?, rref)?;
    Ok(Json(datastream).into_response())
}

pub fn observations(
    state: &ApiState,
    datastream_id: &str,
    query: &ODataQuery,
) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let page = query.page(state.limits.history_page_size);
    let list = history::datastream_observations(
        state.mapper(),
        &query.expansions()?,
        rref,
        page.skip,
        page.top,
    )?;
    Ok(Json(list).into_response())
}

pub fn observed_property(
    state: &ApiState,
    datastream_id: &str,
    query: &ODataQuery,
) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let property = mapper::to_observed_property(state.mapper(), &query.expansions()?, rref)?;
    Ok(Json(property).into_response())
}

pub fn sensor(state: &ApiState, datastream_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let sensor = mapper::to_sensor(state.mapper(), &query.expansions()?, rref)?;
    Ok(Json(sensor).into_response())
}

pub fn thing(state: &ApiState, datastream_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let (provider, _, _) = resource_target(state, datastream_id)?;
    let thing = mapper::to_thing(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(thing).into_response())
}

pub fn relation_ref(state: &ApiState, datastream_id: &str, relation: &str) -> ApiResult<Response> {
    let (provider, _, _) = resource_target(state, datastream_id)?;
    match relation {
        // sensor and observed property share the datastream's id space
        "Sensor" | "ObservedProperty" => {
            Ok(ref_list([Value::String(datastream_id.to_string())]))
        }
        "Thing" => Ok(ref_list([Value::String(provider.name)])),
        other => Err(GatewayError::NotFound(format!("unknown relation {other}")).into()),
    }
}

pub fn create(state: &ApiState, body: Value) -> ApiResult<Response> {
    let datastream: ExpandedDatastream = payload(body)?;
    validate::validate_datastream(&datastream)?;

    let provider_id = datastream
        .thing
        .as_ref()
        .and_then(|r| r.id.as_str().map(str::to_string))
        .or_else(|| datastream.name.as_deref().map(reverse::sanitize_id))
        .ok_or_else(|| GatewayError::Validation("name not found in Datastream".to_string()))?;
    id::validated_provider_id(&provider_id)?;

    let update = reverse::to_datastream_update(&provider_id, &datastream);
    let service = update.service_name.clone();
    state.updates.apply_resource_update(update.into_resource_update())?;

    let provider = provider_or_404(state, &provider_id)?;
    let rref = provider
        .resource(&service, DATASTREAM_RESOURCE)
        .ok_or_else(GatewayError::not_found)?;
    let mapped = mapper::to_datastream(state.mapper(), &ExpansionSettings::empty(), rref)?;
    let created_id = id::resource_id(&provider_id, &service, DATASTREAM_RESOURCE);
    created(&state.links.entity("Datastreams", &created_id), mapped)
}

pub fn update(state: &ApiState, datastream_id: &str, body: Value) -> ApiResult<Response> {
    let datastream: ExpandedDatastream = payload(body)?;
    validate::validate_datastream(&datastream)?;

    let (provider, service, resource) = resource_target(state, datastream_id)?;
    let mut resource_update =
        reverse::to_datastream_update(&provider.name, &datastream).into_resource_update();
    // writes address the resource named by the id, never a renamed one
    resource_update.service = service.clone();
    resource_update.resource = resource.clone();
    state.updates.apply_resource_update(resource_update)?;

    let provider = provider_or_404(state, &provider.name)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let mapped = mapper::to_datastream(state.mapper(), &ExpansionSettings::empty(), rref)?;
    Ok(Json(mapped).into_response())
}

pub fn delete(state: &ApiState, datastream_id: &str) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;
    state
        .updates
        .delete_resource(&provider.name, &service, &resource)?;
    no_content()
}

/// Link a store-backed Sensor or ObservedProperty onto the datastream's
/// resource metadata.
pub fn link_ref(
    state: &ApiState,
    datastream_id: &str,
    relation: &str,
    body: Value,
) -> ApiResult<Response> {
    let reference: RefId = payload(body)?;
    let ref_id = match &reference.id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let (provider, service, resource) = resource_target(state, datastream_id)?;

    let linked = match relation {
        "Sensor" => {
            let sensor = state
                .sensors
                .get(&ref_id)
                .ok_or_else(|| GatewayError::NotFound(format!("unknown sensor {ref_id}")))?;
            reverse::to_datastream_update(
                &provider.name,
                &ExpandedDatastream {
                    sensor: Some(sensor),
                    ..Default::default()
                },
            )
        }
        "ObservedProperty" => {
            let property = state.observed_properties.get(&ref_id).ok_or_else(|| {
                GatewayError::NotFound(format!("unknown observed property {ref_id}"))
            })?;
            reverse::to_datastream_update(
                &provider.name,
                &ExpandedDatastream {
                    observed_property: Some(property),
                    ..Default::default()
                },
            )
        }
        other => {
            return Err(GatewayError::NotFound(format!("unknown relation {other}")).into());
        }
    };

    let mut resource_update = linked.into_resource_update();
    resource_update.service = service;
    resource_update.resource = resource;
    resource_update.value = None;
    state.updates.apply_resource_update(resource_update)?;
    no_content()
}

/// Unlink the Sensor or ObservedProperty metadata from the datastream's
/// resource by blanking its annotation keys.
pub fn unlink_ref(state: &ApiState, datastream_id: &str, relation: &str) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;

    let keys: &[&str] = match relation {
        "Sensor" => &[
            "sensorthings.sensor.id",
            "sensorthings.sensor.name",
            "sensorthings.sensor.description",
            annotations::SENSOR_METADATA,
            annotations::SENSOR_ENCODING_TYPE,
        ],
        "ObservedProperty" => &[
            "sensorthings.observedProperty.id",
            "sensorthings.observedProperty.name",
            "sensorthings.observedProperty.description",
            annotations::OBSERVED_PROPERTY_DEFINITION,
        ],
        other => {
            return Err(GatewayError::NotFound(format!("unknown relation {other}")).into());
        }
    };

    let mut metadata = serde_json::Map::new();
    for key in keys {
        metadata.insert(key.to_string(), Value::Null);
    }
    state
        .updates
        .apply_resource_update(sensorgate_core::twin::ResourceUpdate {
            provider: provider.name,
            service,
            resource,
            value: None,
            timestamp: None,
            metadata,
        })?;
    no_content()
}
