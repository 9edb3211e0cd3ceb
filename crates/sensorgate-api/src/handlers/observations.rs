//! `/Observations` handlers
//!
//! Reads reconcile the id-encoded timestamp against the live value and the
//! history backend. Creates append a new live value to the addressed
//! datastream's resource; stored observations themselves are immutable.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use sensorgate_common::GatewayError;
use sensorgate_sensorthings::annotations;
use sensorgate_sensorthings::dto::ExpandedObservation;
use sensorgate_sensorthings::expand::ExpansionSettings;
use sensorgate_sensorthings::{history, id, mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, payload, ref_list, resource_target};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut observations = Vec::new();
    for provider in state.session.list_providers() {
        observations.extend(mapper::live_observations(ctx, &expansions, &provider)?.value);
    }
    let list = paginate(
        observations,
        query.page(state.limits.page_size),
        &state.links.collection("Observations"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, observation_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let observation =
        history::observation_by_id(state.mapper(), &query.expansions()?, observation_id)?;
    Ok(Json(observation).into_response())
}

pub fn datastream(state: &ApiState, observation_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, observation_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let datastream = mapper::to_datastream(state.mapper(), &query.expansions()?, rref)?;
    Ok(Json(datastream).into_response())
}

pub fn datastream_ref(state: &ApiState, observation_id: &str) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, observation_id)?;
    Ok(ref_list([Value::String(id::resource_id(
        &provider.name,
        &service,
        &resource,
    ))]))
}

pub fn feature_of_interest(
    state: &ApiState,
    observation_id: &str,
    query: &ODataQuery,
) -> ApiResult<Response> {
    let (provider, _, _) = resource_target(state, observation_id)?;
    let feature = mapper::to_feature_of_interest(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(feature).into_response())
}

pub fn feature_of_interest_ref(state: &ApiState, observation_id: &str) -> ApiResult<Response> {
    let (provider, _, _) = resource_target(state, observation_id)?;
    Ok(ref_list([Value::String(provider.name)]))
}

/// `/Observations(id)/Datastream/<relation>` navigation.
pub fn datastream_relation(
    state: &ApiState,
    observation_id: &str,
    relation: &str,
    query: &ODataQuery,
) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, observation_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let expansions = query.expansions()?;
    match relation {
        "Thing" => {
            let thing = mapper::to_thing(state.mapper(), &expansions, &provider)?;
            Ok(Json(thing).into_response())
        }
        "Sensor" => {
            let sensor = mapper::to_sensor(state.mapper(), &expansions, rref)?;
            Ok(Json(sensor).into_response())
        }
        "ObservedProperty" => {
            let property = mapper::to_observed_property(state.mapper(), &expansions, rref)?;
            Ok(Json(property).into_response())
        }
        "Observations" => {
            let page = query.page(state.limits.history_page_size);
            let list = history::datastream_observations(
                state.mapper(),
                &expansions,
                rref,
                page.skip,
                page.top,
            )?;
            Ok(Json(list).into_response())
        }
        other => Err(GatewayError::NotFound(format!("unknown relation {other}")).into()),
    }
}

pub fn create(state: &ApiState, body: Value) -> ApiResult<Response> {
    let observation: ExpandedObservation = payload(body)?;
    validate::validate_observation(&observation)?;

    let datastream_id = observation
        .datastream
        .as_ref()
        .map(|r| match &r.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| {
            GatewayError::Validation("Datastream not found in Observation".to_string())
        })?;
    create_in_datastream(state, &datastream_id, observation)
}

/// `POST /Datastreams(id)/Observations`.
pub fn create_for_datastream(
    state: &ApiState,
    datastream_id: &str,
    body: Value,
) -> ApiResult<Response> {
    let observation: ExpandedObservation = payload(body)?;
    validate::validate_observation(&observation)?;
    create_in_datastream(state, datastream_id, observation)
}

fn create_in_datastream(
    state: &ApiState,
    datastream_id: &str,
    observation: ExpandedObservation,
) -> ApiResult<Response> {
    let (provider, service, resource) = resource_target(state, datastream_id)?;

    let mut metadata = serde_json::Map::new();
    if let Some(quality) = &observation.result_quality {
        metadata.insert(annotations::OBSERVATION_QUALITY.to_string(), quality.clone());
    }
    state
        .updates
        .apply_resource_update(sensorgate_core::twin::ResourceUpdate {
            provider: provider.name.clone(),
            service: service.clone(),
            resource: resource.clone(),
            value: observation.result.clone(),
            timestamp: observation.phenomenon_time,
            metadata,
        })?;

    let provider = state
        .session
        .provider(&provider.name)
        .ok_or_else(GatewayError::not_found)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let mapped = mapper::to_observation(state.mapper(), &ExpansionSettings::empty(), rref, None)?;
    let self_link = match mapped.id.as_str() {
        Some(observation_id) => state.links.entity("Observations", observation_id),
        None => state.links.collection("Observations"),
    };
    created(&self_link, mapped)
}

pub fn reject_mutation() -> ApiResult<Response> {
    Err(GatewayError::Conflict("stored observations are immutable".to_string()).into())
}
