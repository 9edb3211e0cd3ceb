//! `/FeaturesOfInterest` handlers
//!
//! Twin-backed features of interest are derived from the provider's admin
//! location and cannot be deleted directly; store-backed ones were created
//! over REST and live until linked to an observation.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use sensorgate_common::GatewayError;
use sensorgate_sensorthings::dto::FeatureOfInterest;
use sensorgate_sensorthings::store::DtoStore;
use sensorgate_sensorthings::{id, mapper, validate};

use crate::error::ApiResult;
use crate::handlers::{created, no_content, payload, provider_or_404};
use crate::query::{paginate, ODataQuery};
use crate::state::ApiState;

pub fn list(state: &ApiState, query: &ODataQuery) -> ApiResult<Response> {
    let expansions = query.expansions()?;
    let ctx = state.mapper();
    let mut features = Vec::new();
    for provider in state.session.list_providers() {
        features.push(mapper::to_feature_of_interest(ctx, &expansions, &provider)?);
    }
    features.extend(state.features_of_interest.values());
    let list = paginate(
        features,
        query.page(state.limits.page_size),
        &state.links.collection("FeaturesOfInterest"),
    );
    Ok(Json(list).into_response())
}

pub fn get(state: &ApiState, feature_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    if let Some(stored) = state.features_of_interest.get(feature_id) {
        return Ok(Json(stored).into_response());
    }
    let provider_id = id::extract_first_id_segment(feature_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let feature = mapper::to_feature_of_interest(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(feature).into_response())
}

pub fn observations(state: &ApiState, feature_id: &str, query: &ODataQuery) -> ApiResult<Response> {
    let provider_id = id::extract_first_id_segment(feature_id)?;
    let provider = provider_or_404(state, provider_id)?;
    let list = mapper::live_observations(state.mapper(), &query.expansions()?, &provider)?;
    Ok(Json(list).into_response())
}

pub fn create(state: &ApiState, body: Value) -> ApiResult<Response> {
    let feature: FeatureOfInterest = payload(body)?;
    validate::validate_feature_of_interest(&feature)?;

    let feature_id = match &feature.id {
        Value::Null => Uuid::new_v4().to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let self_link = state.links.entity("FeaturesOfInterest", &feature_id);
    let stored = FeatureOfInterest {
        id: Value::String(feature_id.clone()),
        observations_link: Some(state.links.relation(&self_link, "Observations")),
        self_link: Some(self_link.clone()),
        ..feature
    };
    state.features_of_interest.insert(&feature_id, stored.clone());
    created(&self_link, stored)
}

pub fn update(state: &ApiState, feature_id: &str, body: Value) -> ApiResult<Response> {
    let feature: FeatureOfInterest = payload(body)?;
    validate::validate_feature_of_interest(&feature)?;
    if state.features_of_interest.get(feature_id).is_none() {
        return Err(GatewayError::Conflict(
            "twin-backed features of interest follow the provider location".to_string(),
        )
        .into());
    }
    let self_link = state.links.entity("FeaturesOfInterest", feature_id);
    let stored = FeatureOfInterest {
        id: Value::String(feature_id.to_string()),
        observations_link: Some(state.links.relation(&self_link, "Observations")),
        self_link: Some(self_link),
        ..feature
    };
    state.features_of_interest.insert(feature_id, stored.clone());
    Ok(Json(stored).into_response())
}

pub fn delete(state: &ApiState, feature_id: &str) -> ApiResult<Response> {
    if state.features_of_interest.remove(feature_id).is_some() {
        return no_content();
    }
    let provider_id = id::extract_first_id_segment(feature_id)?;
    if state.session.provider(provider_id).is_some() {
        return Err(GatewayError::Conflict(
            "feature of interest is derived from the provider location".to_string(),
        )
        .into());
    }
    Err(GatewayError::NotFound(format!("unknown feature of interest {feature_id}")).into())
}
