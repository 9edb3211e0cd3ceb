//! `/Things` handlers

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use sensorgate_common::GatewayError;
use sensorgate_sensorthings::dto::{ExpandedThing, ResultList};
use sensorgate_sensorthings::expand::ExpansionSettings;
use sensorgate_sensorthings::reverse::{self, SensorThingsUpdate};
use sensorgate_sensorthings::{history, id, mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, no_content, payload, provider_or_404, ref_list};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut things = Vec::new();
    for provider in state.session.list_providers() {
        things.push(mapper::to_thing(ctx, &expansions, &provider)?);
    }
    let list = paginate(
        things,
        query.page(state.limits.page_size),
        &state.links.collection("Things"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, thing_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
    let thing = mapper::to_thing(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(thing).into_response())
}

pub fn datastreams(state: &ApiState, thing_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
    let streams =
        mapper::provider_datastreams(state.mapper(), &query.expansions()?, &provider)?.value;
    let link = state
        .links
        .relation(&state.links.entity("Things", thing_id), "Datastreams");
    let list = paginate(streams, query.page(state.limits.page_size), &link);
    Ok(Json(list).into_response())
}

pub fn datastreams_ref(state: &ApiState, thing_id: &str) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
    let ids = mapper::datastream_refs(&provider)
        .map(|r| {
            Value::String(id::resource_id(
                &r.provider.name,
                &r.service.name,
                &r.resource.name,
            ))
        })
        .collect::<Vec<_>>();
    Ok(ref_list(ids))
}

pub fn locations(state: &ApiState, thing_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
    let location = mapper::to_location(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(ResultList::of(vec![location])).into_response())
}

pub fn locations_ref(state: &ApiState, thing_id: &str) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
    let location = mapper::to_location(state.mapper(), &ExpansionSettings::empty(), &provider)?;
    Ok(ref_list([location.id]))
}

pub fn historical_locations_ref(state: &ApiState, thing_id: &str) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
    let historical =
        mapper::to_historical_location(state.mapper(), &ExpansionSettings::empty(), &provider)?;
    Ok(ref_list([historical.id]))
}

pub fn historical_locations(
    state: &ApiState,
    thing_id: &str,
    query: &ODataQuery,
) -> ApiResult<Response> {
    let provider = provider_or_404(state, thing_id)?;
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
    let thing: ExpandedThing = payload(body)?;
    validate::validate_thing(&thing)?;

    let updates = reverse::to_thing_updates(&thing);
    let provider_id = match updates.first() {
        Some(SensorThingsUpdate::Thing(update)) => update.provider_id.clone(),
        _ => return Err(GatewayError::BadRequest("empty Thing payload".to_string()).into()),
    };
    apply_updates(state, updates)?;

    let provider = provider_or_404(state, &provider_id)?;
    let mapped = mapper::to_thing(state.mapper(), &ExpansionSettings::empty(), &provider)?;
    let self_link = state.links.entity("Things", &provider_id);
    created(&self_link, mapped)
}

pub fn update(state: &ApiState, thing_id: &str, body: Value) -> ApiResult<Response> {
    let thing: ExpandedThing = payload(body)?;
    validate::validate_thing(&thing)?;
    provider_or_404(state, thing_id)?;

    // an update addresses the existing provider, never a renamed one
    let update = reverse::ThingUpdate {
        provider_id: thing_id.to_string(),
        name: thing.name.clone(),
        description: thing.description.clone(),
        location: thing
            .locations
            .as_deref()
            .and_then(reverse::aggregate_locations),
        external_id: thing.id.clone(),
        properties: Default::default(),
    };
    state.updates.apply_provider_update(update.into_provider_update())?;

    let provider = provider_or_404(state, thing_id)?;
    let mapped = mapper::to_thing(state.mapper(), &ExpansionSettings::empty(), &provider)?;
    Ok(Json(mapped).into_response())
}

pub fn delete(state: &ApiState, thing_id: &str) -> ApiResult<Response> {
    id::validated_provider_id(thing_id)?;
    state.updates.delete_provider(thing_id)?;
    no_content()
}

pub(crate) fn apply_updates(
    state: &ApiState,
    updates: Vec<SensorThingsUpdate>,
) -> ApiResult<()> {
    for update in updates {
        match update {
            SensorThingsUpdate::Thing(thing) => {
                state.updates.apply_provider_update(thing.into_provider_update())?;
            }
            SensorThingsUpdate::Datastream(datastream) => {
                state
                    .updates
                    .apply_resource_update(datastream.into_resource_update())?;
            }
        }
    }
    Ok(())
}
