//! `/HistoricalLocations` handlers
//!
//! Historical locations are immutable records of where a thing was; writes
//! against them are conflicts.

use axum::response::{IntoResponse, Response};
use axum::Json;

use sensorgate_common::GatewayError;
use sensorgate_core::{ADMIN_SERVICE, LOCATION};
use sensorgate_sensorthings::dto::ResultList;
use sensorgate_sensorthings::{history, id, mapper};

use crate::error::ApiResult;
use crate::handlers::{provider_or_404, ref_list};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut historical = Vec::new();
    for provider in state.session.list_providers() {
        let has_location = provider
            .service(ADMIN_SERVICE)
            .and_then(|svc| svc.resource(LOCATION))
            .map(|rc| rc.is_set())
            .unwrap_or(false);
        if has_location {
            historical.push(mapper::to_historical_location(ctx, &expansions, &provider)?);
        }
    }
    let list = paginate(
        historical,
        query.page(state.limits.page_size),
        &state.links.collection("HistoricalLocations"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, historical_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let historical = history::historical_location_by_id(
        state.mapper(),
        &query.expansions()?,
        historical_id,
    )?;
    Ok(Json(historical).into_response())
}

pub fn thing(state: &ApiState, historical_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(historical_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let thing = mapper::to_thing(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(thing).into_response())
}

pub fn thing_ref(state: &ApiState, historical_id: &str) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(historical_id)?;
    let provider = provider_or_404(state, provider_id)?;
    Ok(ref_list([serde_json::Value::String(provider.name)]))
}

pub fn locations(state: &ApiState, historical_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(historical_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let location = mapper::to_location(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(ResultList::of(vec![location])).into_response())
}

pub fn reject_mutation() -> ApiResult<Response> {
    Err(GatewayError::Conflict("historical locations are immutable".to_string()).into())
}
