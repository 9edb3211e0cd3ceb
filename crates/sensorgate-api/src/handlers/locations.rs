//! `/Locations` handlers
//!
//! Locations are views over the provider's admin location; the timestamp
//! encoded in a Location id identifies the revision but resolution always
//! addresses the provider named by the first segment.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use sensorgate_common::GatewayError;
use sensorgate_core::{ADMIN_SERVICE, LOCATION};
use sensorgate_sensorthings::dto::{ExpandedLocation, ResultList};
use sensorgate_sensorthings::expand::ExpansionSettings;
use sensorgate_sensorthings::reverse;
use sensorgate_sensorthings::{history, id, mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, no_content, payload, provider_or_404, ref_list};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

fn located_providers(state: &ApiState) -> Vec<sensorgate_core::ProviderSnapshot> {
    state
        .session
        .list_providers()
        .into_iter()
        .filter(|p| {
            p.service(ADMIN_SERVICE)
                .and_then(|svc| svc.resource(LOCATION))
                .map(|rc| rc.is_set())
                .unwrap_or(false)
        })
        .collect()
}

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut locations = Vec::new();
    for provider in located_providers(state) {
        locations.push(mapper::to_location(ctx, &expansions, &provider)?);
    }
    let list = paginate(
        locations,
        query.page(state.limits.page_size),
        &state.links.collection("Locations"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, location_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(location_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let location = mapper::to_location(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(location).into_response())
}

pub fn things(state: &ApiState, location_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(location_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let thing = mapper::to_thing(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(ResultList::of(vec![thing])).into_response())
}

pub fn things_ref(state: &ApiState, location_id: &str) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(location_id)?;
    let provider = provider_or_404(state, provider_id)?;
    Ok(ref_list([Value::String(provider.name)]))
}

pub fn historical_locations(
    state: &ApiState,
    location_id: &str,
    query: &ODataQuery,
) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(location_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let page = query.page(state.limits.history_page_size);
    let list = history::provider_historical_locations(
        state.mapper(),
        &query.expansions()?,
        &provider,
        page.skip,
        page.top,
    )?;
    Ok(Json(list).into_response())
}

pub fn create(state: &ApiState, body: Value) -> ApiResult<Response> {
    let location: ExpandedLocation = payload(body)?;
    validate::validate_location(&location)?;

    // the owning thing names the provider; a standalone location derives
    // one from its own name
    let provider_id = location
        .things
        .as_deref()
        .and_then(|things| things.first())
        .and_then(|r| r.id.as_str().map(str::to_string))
        .or_else(|| location.name.as_deref().map(reverse::sanitize_id))
        .ok_or_else(|| GatewayError::Validation("name not found in Location".to_string()))?;
    id::validated_provider_id(&provider_id)?;

    apply_location(state, &provider_id, &location)?;

    let provider = provider_or_404(state, &provider_id)?;
    let mapped = mapper::to_location(state.mapper(), &ExpansionSettings::empty(), &provider)?;
    let self_link = match mapped.id.as_str() {
        Some(mapped_id) => state.links.entity("Locations", mapped_id),
        None => state.links.collection("Locations"),
    };
    created(&self_link, mapped)
}

pub fn update(state: &ApiState, location_id: &str, body: Value) -> ApiResult<Response> {
    let location: ExpandedLocation = payload(body)?;
    validate::validate_location(&location)?;

    let provider_id = id::extract_first_id_segment(location_id)?.to_string();
    provider_or_404(state, &provider_id)?;
    apply_location(state, &provider_id, &location)?;

    let provider = provider_or_404(state, &provider_id)?;
    let mapped = mapper::to_location(state.mapper(), &ExpansionSettings::empty(), &provider)?;
    Ok(Json(mapped).into_response())
}

pub fn delete(state: &ApiState, location_id: &str) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(location_id)?;
    provider_or_404(state, provider_id)?;
    state
        .updates
        .delete_resource(provider_id, ADMIN_SERVICE, LOCATION)?;
    no_content()
}

fn apply_location(
    state: &ApiState,
    provider_id: &str,
    location: &ExpandedLocation,
) -> ApiResult<()> {
    let geo = location
        .location
        .as_ref()
        .and_then(|g| serde_json::to_value(g).ok());
    state
        .updates
        .apply_provider_update(sensorgate_core::twin::ProviderUpdate {
            provider_id: provider_id.to_string(),
            friendly_name: None,
            description: None,
            location: geo,
            properties: Default::default(),
        })?;
    Ok(())
}
