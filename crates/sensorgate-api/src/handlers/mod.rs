//! Request handlers for the SensorThings binding
//!
//! One module per entity collection, plus the service root document.
//! Handlers are synchronous: twin reads and history queries happen inline
//! on the request task, and each call maps fresh from the current snapshot.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use sensorgate_common::{GatewayError, Result};
use sensorgate_core::snapshot::ProviderSnapshot;
use sensorgate_sensorthings::dto::{NameUrl, RefId, ResultList, RootResponse};
use sensorgate_sensorthings::id;

use crate::error::ApiResult;
use crate::state::ApiState;

pub mod datastreams;
pub mod features_of_interest;
pub mod historical_locations;
pub mod locations;
pub mod observations;
pub mod observed_properties;
pub mod sensors;
pub mod things;

/// The service root document listing the entity collections.
pub fn service_document(state: &ApiState) -> ApiResult<Response> {
    let collections = [
        "Things",
        "Locations",
        "HistoricalLocations",
        "Datastreams",
        "Sensors",
        "Observations",
        "ObservedProperties",
        "FeaturesOfInterest",
    ];
    let value = collections
        .iter()
        .map(|name| NameUrl {
            name: name.to_string(),
            url: state.links.collection(name),
        })
        .collect();
    Ok(Json(RootResponse { value }).into_response())
}

/// Look up a provider by a single-segment id.
pub(crate) fn provider_or_404(state: &ApiState, provider_id: &str) -> Result<ProviderSnapshot> {
    id::validated_provider_id(provider_id)?;
    state
        .session
        .provider(provider_id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {provider_id}")))
}

/// Resolve a `provider~service~resource` id against the twin, returning
/// the provider snapshot together with the service and resource names.
pub(crate) fn resource_target(
    state: &ApiState,
    composite_id: &str,
) -> Result<(ProviderSnapshot, String, String)> {
    let provider_name = id::extract_first_id_segment(composite_id)?.to_string();
    let provider = state
        .session
        .provider(&provider_name)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {provider_name}")))?;
    let service = id::second_id_segment(composite_id)
        .ok_or_else(GatewayError::invalid_id)?
        .to_string();
    let resource = id::third_id_segment(composite_id)
        .ok_or_else(GatewayError::invalid_id)?
        .to_string();
    if provider.resource(&service, &resource).is_none() {
        return Err(GatewayError::NotFound(format!(
            "unknown resource {service}/{resource}"
        )));
    }
    Ok((provider, service, resource))
}

/// A `201 Created` response with the entity body and its Location header.
pub(crate) fn created(self_link: &str, body: impl serde::Serialize) -> ApiResult<Response> {
    let payload =
        serde_json::to_value(&body).map_err(|e| GatewayError::Serialization(e.to_string()))?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, self_link.to_string())],
        Json(payload),
    )
        .into_response())
}

/// A bare `204 No Content` response.
pub(crate) fn no_content() -> ApiResult<Response> {
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Turn entity ids into a `$ref` association list.
pub(crate) fn ref_list(ids: impl IntoIterator<Item = Value>) -> Response {
    let value: Vec<RefId> = ids.into_iter().map(RefId::new).collect();
    Json(ResultList::of(value)).into_response()
}

/// Parse a request body into a typed payload.
pub(crate) fn payload<T: serde::de::DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| GatewayError::BadRequest(format!("malformed payload: {e}")))
}
