//! History reconciliation
//!
//! Observation and historical-location ids encode a timestamp; the twin
//! only holds the latest value. When a requested timestamp does not match
//! the live value at millisecond precision, the configured history backend
//! is consulted for the exact row.
//!
//! Lookbacks query at `requested + 1ms`: the backend compares stored
//! full-precision timestamps (e.g. `00:00:00.123456`) against the
//! millisecond-truncated request time, and the offset keeps the wanted row
//! inside the search bound. The returned row's truncated timestamp is
//! re-verified before it is served, so a backend with different boundary
//! semantics yields not-found rather than a wrong row.

use chrono::Duration;
use tracing::debug;

use sensorgate_common::{GatewayError, Result};
use sensorgate_core::snapshot::{truncate_to_millis, ProviderSnapshot, ResourceRef};
use sensorgate_core::{ADMIN_SERVICE, LOCATION};

use crate::dto::{HistoricalLocation, Observation, ResultList};
use crate::expand::ExpansionSettings;
use crate::id;
use crate::mapper::{self, MapperContext};

/// Resolve one Observation by its composite id.
///
/// The live value wins on an exact millisecond match; an older timestamp is
/// looked up in history; anything else is not found.
pub fn observation_by_id(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    observation_id: &str,
) -> Result<Observation> {
    let provider_name = id::extract_first_id_segment(observation_id)?.to_string();
    let provider = ctx
        .session
        .provider(&provider_name)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {provider_name}")))?;
    let service = id::second_id_segment(observation_id)
        .ok_or_else(GatewayError::invalid_id)?
        .to_string();
    let resource = id::third_id_segment(observation_id)
        .ok_or_else(GatewayError::invalid_id)?
        .to_string();
    let requested = truncate_to_millis(id::timestamp_from_id(observation_id)?);

    let rref = provider
        .resource(&service, &resource)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown resource {resource}")))?;

    let Some(live) = rref.resource.value.as_ref() else {
        return Err(GatewayError::not_found());
    };

    if mapper::matches_live(requested, live) {
        return mapper::to_observation(ctx, expansions, rref, None);
    }
    if requested < live.milli_timestamp() {
        let Some(history) = ctx.history else {
            return Err(GatewayError::not_found());
        };
        debug!(
            provider = %provider_name,
            service = %service,
            resource = %resource,
            requested = %requested,
            "observation older than live value, consulting history"
        );
        let stored = history
            .get_single_value(
                &provider_name,
                &service,
                &resource,
                requested + Duration::milliseconds(1),
            )?
            .ok_or_else(GatewayError::not_found)?;
        if stored.milli_timestamp() != requested {
            return Err(GatewayError::not_found());
        }
        return mapper::to_observation(ctx, expansions, rref, Some(&stored));
    }
    Err(GatewayError::not_found())
}

/// Load a page of a datastream's stored observations.
///
/// Without a history backend the page is empty; callers fall back to the
/// live value through [`datastream_observations`].
pub fn load_historical_observations(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    rref: ResourceRef<'_>,
    skip: usize,
    limit: usize,
) -> Result<ResultList<Observation>> {
    let Some(history) = ctx.history else {
        return Ok(ResultList::default());
    };

    let provider = &rref.provider.name;
    let service = &rref.service.name;
    let resource = &rref.resource.name;

    let count = history.get_stored_value_count(provider, service, resource)?;
    let stored = history.get_value_range(provider, service, resource, None, None, skip, limit)?;

    let mut observations = Vec::with_capacity(stored.len());
    for timed in &stored {
        observations.push(mapper::to_observation(ctx, expansions, rref, Some(timed))?);
    }

    Ok(ResultList {
        count,
        next_link: None,
        value: observations,
    })
}

/// A datastream's observations: the stored history page when one exists,
/// otherwise the single live value. Querying history first avoids duplicate
/// live/historical entries when both exist.
pub fn datastream_observations(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    rref: ResourceRef<'_>,
    skip: usize,
    limit: usize,
) -> Result<ResultList<Observation>> {
    let list = load_historical_observations(ctx, expansions, rref, skip, limit)?;
    if !list.value.is_empty() {
        return Ok(list);
    }
    if rref.resource.is_set() {
        let live = mapper::to_observation(ctx, expansions, rref, None)?;
        return Ok(ResultList::of(vec![live]));
    }
    Ok(ResultList::default())
}

/// Resolve one HistoricalLocation by its composite id, reconciling against
/// the admin location's history when the timestamp is older than the live
/// location.
pub fn historical_location_by_id(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    historical_id: &str,
) -> Result<HistoricalLocation> {
    let provider_name = id::extract_first_id_segment(historical_id)?.to_string();
    let requested = truncate_to_millis(id::timestamp_from_id(historical_id)?);

    let provider = ctx
        .session
        .provider(&provider_name)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {provider_name}")))?;

    let live = provider
        .service(ADMIN_SERVICE)
        .and_then(|svc| svc.resource(LOCATION))
        .and_then(|rc| rc.value.as_ref());

    if let Some(live) = live {
        if mapper::matches_live(requested, live) {
            return mapper::to_historical_location(ctx, expansions, &provider);
        }
        if requested < live.milli_timestamp() {
            if let Some(history) = ctx.history {
                let stored = history
                    .get_single_value(
                        &provider_name,
                        ADMIN_SERVICE,
                        LOCATION,
                        requested + Duration::milliseconds(1),
                    )?
                    .ok_or_else(GatewayError::not_found)?;
                if stored.milli_timestamp() == requested {
                    return mapper::to_historical_location_at(
                        ctx,
                        expansions,
                        &provider,
                        stored.timestamp,
                    );
                }
            }
        }
    }
    Err(GatewayError::not_found())
}

/// A provider's location history as HistoricalLocations, falling back to
/// the single live location when no history page exists.
pub fn provider_historical_locations(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
    skip: usize,
    limit: usize,
) -> Result<ResultList<HistoricalLocation>> {
    if let Some(history) = ctx.history {
        let count = history.get_stored_value_count(&provider.name, ADMIN_SERVICE, LOCATION)?;
        let stored = history.get_value_range(
            &provider.name,
            ADMIN_SERVICE,
            LOCATION,
            None,
            None,
            skip,
            limit,
        )?;
        if !stored.is_empty() {
            let mut locations = Vec::with_capacity(stored.len());
            for timed in &stored {
                locations.push(mapper::to_historical_location_at(
                    ctx,
                    expansions,
                    provider,
                    timed.timestamp,
                )?);
            }
            return Ok(ResultList {
                count,
                next_link: None,
                value: locations,
            });
        }
    }
    Ok(ResultList::of(vec![mapper::to_historical_location(
        ctx, expansions, provider,
    )?]))
}

/// What an observation id refers to, resolved without touching history.
/// Used by the navigation endpoints below `/Observations(id)`.
pub fn observation_target(
    ctx: MapperContext<'_>,
    observation_id: &str,
) -> Result<(ProviderSnapshot, String, String)> {
    let provider_name = id::extract_first_id_segment(observation_id)?.to_string();
    let provider = ctx
        .session
        .provider(&provider_name)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {provider_name}")))?;
    let service = id::second_id_segment(observation_id)
        .ok_or_else(GatewayError::invalid_id)?
        .to_string();
    let resource = id::third_id_segment(observation_id)
        .ok_or_else(GatewayError::invalid_id)?
        .to_string();
    if provider.resource(&service, &resource).is_none() {
        return Err(GatewayError::NotFound(format!("unknown resource {resource}")));
    }
    Ok((provider, service, resource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use sensorgate_core::snapshot::{ResourceSnapshot, ServiceSnapshot, TimedValue};
    use sensorgate_core::{InMemoryHistory, InMemoryTwin, TwinSession};
    use serde_json::json;
    use test_log::test;

    use crate::mapper::LinkBase;

    fn live_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(123)
    }

    fn twin_with_live_value() -> InMemoryTwin {
        let mut sensors = ServiceSnapshot::new("sensors");
        let mut temperature = ResourceSnapshot::new("temperature");
        temperature.value = Some(TimedValue::new(json!(21.5), live_ts()));
        sensors.resources.push(temperature);

        let mut provider = ProviderSnapshot::new("station-1");
        provider.services.push(sensors);

        let twin = InMemoryTwin::new();
        twin.insert_provider(provider);
        twin
    }

    fn obs_id(at: DateTime<Utc>) -> String {
        id::observation_id("station-1", "sensors", "temperature", at)
    }

    struct Fixture {
        twin: InMemoryTwin,
        history: Option<InMemoryHistory>,
        links: LinkBase,
    }

    impl Fixture {
        fn without_history() -> Self {
            Self {
                twin: twin_with_live_value(),
                history: None,
                links: LinkBase::new("https://gw.example.org"),
            }
        }

        fn with_history() -> Self {
            let mut fixture = Self::without_history();
            fixture.history = Some(InMemoryHistory::new());
            fixture
        }

        fn ctx(&self) -> MapperContext<'_> {
            MapperContext {
                session: &self.twin,
                history: self
                    .history
                    .as_ref()
                    .map(|h| h as &dyn sensorgate_core::HistoryProvider),
                links: &self.links,
                embedded_limit: 25,
            }
        }
    }

    #[test]
    fn test_live_timestamp_returns_live_value() {
        let fixture = Fixture::without_history();
        let observation =
            observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), &obs_id(live_ts()))
                .unwrap();
        assert_eq!(observation.result, Some(json!(21.5)));
        assert_eq!(observation.phenomenon_time, Some(live_ts()));
    }

    #[test]
    fn test_older_timestamp_without_history_is_not_found() {
        let fixture = Fixture::without_history();
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), &obs_id(older))
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn test_older_timestamp_found_in_history() {
        let fixture = Fixture::with_history();
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // stored with microsecond precision beyond the encoded millisecond
        let stored_at = older + chrono::Duration::microseconds(456);
        fixture.history.as_ref().unwrap().record(
            "station-1",
            "sensors",
            "temperature",
            stored_at,
            json!(19.0),
        );

        let observation =
            observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), &obs_id(older))
                .unwrap();
        assert_eq!(observation.result, Some(json!(19.0)));
    }

    #[test]
    fn test_history_timestamp_mismatch_is_not_found() {
        let fixture = Fixture::with_history();
        let requested = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::milliseconds(50);
        // nearest stored row is older than the requested millisecond
        fixture.history.as_ref().unwrap().record(
            "station-1",
            "sensors",
            "temperature",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            json!(18.0),
        );

        let err = observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), &obs_id(requested))
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn test_future_timestamp_is_not_found() {
        let fixture = Fixture::with_history();
        let future = live_ts() + chrono::Duration::seconds(10);
        let err = observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), &obs_id(future))
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn test_unknown_resource_is_not_found() {
        let fixture = Fixture::without_history();
        let bogus = id::observation_id("station-1", "sensors", "pressure", live_ts());
        let err = observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), &bogus)
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn test_malformed_id_is_bad_request() {
        let fixture = Fixture::without_history();
        let err = observation_by_id(fixture.ctx(), &ExpansionSettings::empty(), "~broken")
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn test_observation_listing_prefers_history() {
        let fixture = Fixture::with_history();
        let history = fixture.history.as_ref().unwrap();
        let base = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        for i in 0..3 {
            history.record(
                "station-1",
                "sensors",
                "temperature",
                base + chrono::Duration::minutes(i),
                json!(i),
            );
        }

        let provider = fixture.twin.provider("station-1").unwrap();
        let rref = provider.resource("sensors", "temperature").unwrap();
        let list =
            datastream_observations(fixture.ctx(), &ExpansionSettings::empty(), rref, 0, 500)
                .unwrap();
        assert_eq!(list.count, Some(3));
        assert_eq!(list.value.len(), 3);
        assert_eq!(list.value[0].result, Some(json!(0)));
    }

    #[test]
    fn test_observation_listing_falls_back_to_live_value() {
        let fixture = Fixture::with_history();
        let provider = fixture.twin.provider("station-1").unwrap();
        let rref = provider.resource("sensors", "temperature").unwrap();
        let list =
            datastream_observations(fixture.ctx(), &ExpansionSettings::empty(), rref, 0, 500)
                .unwrap();
        assert_eq!(list.count, None);
        assert_eq!(list.value.len(), 1);
        assert_eq!(list.value[0].result, Some(json!(21.5)));
    }

    #[test]
    fn test_historical_location_listing_falls_back_to_live() {
        let fixture = Fixture::without_history();
        let provider = fixture.twin.provider("station-1").unwrap();
        let list = provider_historical_locations(
            fixture.ctx(),
            &ExpansionSettings::empty(),
            &provider,
            0,
            500,
        )
        .unwrap();
        assert_eq!(list.value.len(), 1);
        // no admin location resource: the timestamp defaults to the epoch
        assert_eq!(list.value[0].id, json!("station-1~0"));
    }
}
