//! `/ObservedProperties` handlers

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use sensorgate_common::GatewayError;
use sensorgate_sensorthings::dto::{Datastream, ObservedProperty, ResultList};
use sensorgate_sensorthings::store::DtoStore;
use sensorgate_sensorthings::{mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, no_content, payload, resource_target};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut properties = Vec::new();
    for provider in state.session.list_providers() {
        for rref in mapper::datastream_refs(&provider) {
            properties.push(mapper::to_observed_property(ctx, &expansions, rref)?);
        }
    }
    properties.extend(state.observed_properties.values());
    let list = paginate(
        properties,
        query.page(state.limits.page_size),
        &state.links.collection("ObservedProperties"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, property_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    if let Some(stored) = state.observed_properties.get(property_id) {
        return Ok(Json(stored).into_response());
    }
    let (provider, service, resource) = resource_target(state, property_id)?;
    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(GatewayError::not_found)?;
    let property = mapper::to_observed_property(state.mapper(), &query.expansions()?, rref)?;
    Ok(Json(property).into_response())
}

pub fn datastreams(state: &ApiState, property_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    if state.observed_properties.get(property_id).is_some() {
        return Ok(Json(ResultList::<Datastream>::default()).into_response());
    }
    let (provider, _, _) = resource_target(state, property_id)?;
    let list = mapper::provider_datastreams(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(list).into_response())
}

pub fn create(state: &ApiState, body: Value) -> ApiResult<Response> {
    let property: ObservedProperty = payload(body)?;
    validate::validate_observed_property(&property)?;

    let property_id = match &property.id {
        Value::Null => Uuid::new_v4().to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let self_link = state.links.entity("ObservedProperties", &property_id);
    let stored = ObservedProperty {
        id: Value::String(property_id.clone()),
        datastreams_link: Some(state.links.relation(&self_link, "Datastreams")),
        self_link: Some(self_link.clone()),
        ..property
    };
    state.observed_properties.insert(&property_id, stored.clone());
    created(&self_link, stored)
}

pub fn update(state: &ApiState, property_id: &str, body: Value) -> ApiResult<Response> {
    let property: ObservedProperty = payload(body)?;
    validate::validate_observed_property(&property)?;
    if state.observed_properties.get(property_id).is_none() {
        return Err(GatewayError::Conflict(
            "twin-backed observed properties are updated via their datastream".to_string(),
        )
        .into());
    }
    let self_link = state.links.entity("ObservedProperties", property_id);
    let stored = ObservedProperty {
        id: Value::String(property_id.to_string()),
        datastreams_link: Some(state.links.relation(&self_link, "Datastreams")),
        self_link: Some(self_link),
        ..property
    };
    state.observed_properties.insert(property_id, stored.clone());
    Ok(Json(stored).into_response())
}

pub fn delete(state: &ApiState, property_id: &str) -> ApiResult<Response> {
    if state.observed_properties.remove(property_id).is_some() {
        return no_content();
    }
    if resource_target(state, property_id).is_ok() {
        return Err(GatewayError::Conflict(
            "observed property is linked to a datastream".to_string(),
        )
        .into());
    }
    Err(GatewayError::NotFound(format!("unknown observed property {property_id}")).into())
}
