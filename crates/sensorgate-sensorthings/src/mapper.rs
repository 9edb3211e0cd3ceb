//! Snapshot-to-DTO mapping
//!
//! Pure transformations from a twin snapshot fragment into exactly one
//! SensorThings entity. Identity comes from the composite id codec, display
//! fields prefer explicit `friendlyName`/`description` values with fixed
//! fallbacks, and navigation links are derived deterministically from the
//! entity's self link: mapping the same snapshot twice yields byte-identical
//! links and structurally equal DTOs.
//!
//! Relations are embedded only when the caller's [`ExpansionSettings`] name
//! them; the computed child lands in the parent's `expansions` map under
//! the relation name.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use sensorgate_common::{GatewayError, Result};
use sensorgate_core::snapshot::{truncate_to_millis, ProviderSnapshot, ResourceRef, TimedValue};
use sensorgate_core::{HistoryProvider, TwinSession, ADMIN_SERVICE, DESCRIPTION, FRIENDLY_NAME, LOCATION};

use crate::annotations;
use crate::dto::{
    Datastream, FeatureOfInterest, HistoricalLocation, Location, Observation, ObservedProperty,
    ResultList, Sensor, Thing, UnitOfMeasurement,
};
use crate::expand::ExpansionSettings;
use crate::geojson::{self, GeoJson};
use crate::history;
use crate::id;
use crate::{
    DEFAULT_ENCODING_TYPE, ENCODING_TYPE_VND_GEO_JSON, NO_DESCRIPTION, NO_DEFINITION, NO_METADATA,
    OBSERVATION_TYPE_OM, VERSION,
};

/// Deterministic link construction rooted at the public base URI.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkBase {
    base: String,
}

impl LinkBase {
    /// Create a link base; a trailing slash on the base URI is ignored.
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Link to a collection, e.g. `{base}/v1.1/Things`.
    pub fn collection(&self, collection: &str) -> String {
        format!("{}/{}/{}", self.base, VERSION, collection)
    }

    /// Self link of one entity, e.g. `{base}/v1.1/Things(abc)`.
    pub fn entity(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}({})", self.base, VERSION, collection, id)
    }

    /// Navigation link below an entity's self link.
    pub fn relation(&self, self_link: &str, relation: &str) -> String {
        format!("{self_link}/{relation}")
    }
}

/// Everything a mapping call needs besides the snapshot fragment itself.
#[derive(Clone, Copy)]
pub struct MapperContext<'a> {
    pub session: &'a dyn TwinSession,
    pub history: Option<&'a dyn HistoryProvider>,
    pub links: &'a LinkBase,
    /// Page size for observation collections embedded via `$expand`.
    pub embedded_limit: usize,
}

/// A provider's admin location, parsed once with its timestamp.
pub(crate) struct LocatedGeo {
    pub geo: Option<GeoJson>,
    pub timestamp: DateTime<Utc>,
}

fn admin_field_value<'a>(provider: &'a ProviderSnapshot, resource: &str) -> Option<&'a Value> {
    provider
        .service(ADMIN_SERVICE)
        .and_then(|svc| svc.resource(resource))
        .and_then(|rc| rc.value.as_ref())
        .map(|tv| &tv.value)
}

/// Render a dynamic value the way a display field expects it.
fn display(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn metadata_string(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata.get(key).and_then(display)
}

/// The provider's admin location with the null policy of §`parse_location`.
pub(crate) fn provider_location(
    provider: &ProviderSnapshot,
    allow_null: bool,
) -> Result<LocatedGeo> {
    let timed = provider
        .service(ADMIN_SERVICE)
        .and_then(|svc| svc.resource(LOCATION))
        .and_then(|rc| rc.value.as_ref());
    let (raw, timestamp) = match timed {
        Some(tv) => (Some(&tv.value), tv.timestamp),
        None => (None, DateTime::UNIX_EPOCH),
    };
    match raw {
        None | Some(Value::Null) => Ok(LocatedGeo {
            geo: geojson::parse_location(None, allow_null)?,
            timestamp,
        }),
        Some(value) => match geojson::parse_location(Some(value), allow_null)? {
            Some(geo) => Ok(LocatedGeo {
                geo: Some(geo),
                timestamp,
            }),
            // unparseable but tolerated; the timestamp is meaningless too
            None => Ok(LocatedGeo {
                geo: None,
                timestamp: DateTime::UNIX_EPOCH,
            }),
        },
    }
}

fn expand_into<T: serde::Serialize>(
    parent: &mut std::collections::BTreeMap<String, Value>,
    relation: &str,
    value: &T,
) -> Result<()> {
    parent.insert(relation.to_string(), serde_json::to_value(value)?);
    Ok(())
}

/// Map a provider to a Thing.
pub fn to_thing(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
) -> Result<Thing> {
    let friendly_name = admin_field_value(provider, FRIENDLY_NAME).and_then(display);
    let description = admin_field_value(provider, DESCRIPTION).and_then(display);

    let self_link = ctx.links.entity("Things", &provider.name);
    let mut thing = Thing {
        id: Value::String(provider.name.clone()),
        name: Some(friendly_name.unwrap_or_else(|| provider.name.clone())),
        description: Some(description.unwrap_or_else(|| NO_DESCRIPTION.to_string())),
        datastreams_link: Some(ctx.links.relation(&self_link, "Datastreams")),
        historical_locations_link: Some(ctx.links.relation(&self_link, "HistoricalLocations")),
        locations_link: Some(ctx.links.relation(&self_link, "Locations")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Datastreams") {
        let list = provider_datastreams(ctx, &expansions.settings_for("Datastreams"), provider)?;
        expand_into(&mut thing.expansions, "Datastreams", &list)?;
    }
    if expansions.should_expand("HistoricalLocations") {
        let list = ResultList::of(vec![to_historical_location(
            ctx,
            &expansions.settings_for("HistoricalLocations"),
            provider,
        )?]);
        expand_into(&mut thing.expansions, "HistoricalLocations", &list)?;
    }
    if expansions.should_expand("Locations") {
        let list = ResultList::of(vec![to_location(
            ctx,
            &expansions.settings_for("Locations"),
            provider,
        )?]);
        expand_into(&mut thing.expansions, "Locations", &list)?;
    }

    Ok(thing)
}

/// Map a provider's admin location to a Location.
pub fn to_location(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
) -> Result<Location> {
    let located = provider_location(provider, false)?;
    let geo = located.geo.unwrap_or_else(GeoJson::empty_point);

    let location_id = id::historical_id(&provider.name, located.timestamp);
    let name = geojson::feature_property(&geo, "name");
    let description = geojson::feature_property(&geo, DESCRIPTION);

    let self_link = ctx.links.entity("Locations", &location_id);
    let mut location = Location {
        id: Value::String(location_id),
        name: Some(name.unwrap_or_else(|| provider.name.clone())),
        description: Some(description.unwrap_or_else(|| NO_DESCRIPTION.to_string())),
        encoding_type: Some(ENCODING_TYPE_VND_GEO_JSON.to_string()),
        location: Some(geo),
        things_link: Some(ctx.links.relation(&self_link, "Things")),
        historical_locations_link: Some(ctx.links.relation(&self_link, "HistoricalLocations")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Things") {
        let list = ResultList::of(vec![to_thing(
            ctx,
            &expansions.settings_for("Things"),
            provider,
        )?]);
        expand_into(&mut location.expansions, "Things", &list)?;
    }
    if expansions.should_expand("HistoricalLocations") {
        let list = ResultList::of(vec![to_historical_location(
            ctx,
            &expansions.settings_for("HistoricalLocations"),
            provider,
        )?]);
        expand_into(&mut location.expansions, "HistoricalLocations", &list)?;
    }

    Ok(location)
}

/// Map a provider's current admin location to a HistoricalLocation.
pub fn to_historical_location(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
) -> Result<HistoricalLocation> {
    let located = provider_location(provider, true)?;
    to_historical_location_at(ctx, expansions, provider, located.timestamp)
}

/// Map one point of a provider's location history to a HistoricalLocation.
pub fn to_historical_location_at(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
    time: DateTime<Utc>,
) -> Result<HistoricalLocation> {
    let historical_id = id::historical_id(&provider.name, time);
    let self_link = ctx.links.entity("HistoricalLocations", &historical_id);
    let mut historical = HistoricalLocation {
        id: Value::String(historical_id),
        time: Some(time),
        thing_link: Some(ctx.links.relation(&self_link, "Thing")),
        locations_link: Some(ctx.links.relation(&self_link, "Locations")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Thing") {
        let thing = to_thing(ctx, &expansions.settings_for("Thing"), provider)?;
        expand_into(&mut historical.expansions, "Thing", &thing)?;
    }
    if expansions.should_expand("Locations") {
        let list = ResultList::of(vec![to_location(
            ctx,
            &expansions.settings_for("Locations"),
            provider,
        )?]);
        expand_into(&mut historical.expansions, "Locations", &list)?;
    }

    Ok(historical)
}

/// Locate a datastream's observed-area payload: a sibling resource tagged
/// as holding it wins over the provider's admin location.
fn observed_area_for(rref: ResourceRef<'_>) -> Result<Option<GeoJson>> {
    let tagged = rref
        .service
        .resources
        .iter()
        .find(|r| r.metadata.contains_key(annotations::OBSERVED_AREA));
    let geo = match tagged.and_then(|r| r.value.as_ref()) {
        Some(tv) => geojson::parse_location(Some(&tv.value), false)?,
        None => provider_location(rref.provider, false)?.geo,
    };
    Ok(geo.as_ref().and_then(geojson::observed_area))
}

/// Map a resource to a Datastream.
pub fn to_datastream(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    rref: ResourceRef<'_>,
) -> Result<Datastream> {
    let metadata = &rref.resource.metadata;
    let datastream_id = id::resource_id(&rref.provider.name, &rref.service.name, &rref.resource.name);

    let unit = UnitOfMeasurement {
        symbol: metadata_string(metadata, annotations::UNIT),
        name: metadata_string(metadata, annotations::UNIT_NAME),
        definition: metadata_string(metadata, annotations::UNIT_DEFINITION),
    };

    let self_link = ctx.links.entity("Datastreams", &datastream_id);
    let mut datastream = Datastream {
        id: Value::String(datastream_id),
        name: Some(
            metadata_string(metadata, FRIENDLY_NAME)
                .unwrap_or_else(|| rref.resource.name.clone()),
        ),
        description: Some(
            metadata_string(metadata, DESCRIPTION).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        ),
        observation_type: Some(OBSERVATION_TYPE_OM.to_string()),
        unit_of_measurement: Some(unit),
        observed_area: observed_area_for(rref)?,
        properties: Some(metadata.clone()),
        observations_link: Some(ctx.links.relation(&self_link, "Observations")),
        observed_property_link: Some(ctx.links.relation(&self_link, "ObservedProperty")),
        sensor_link: Some(ctx.links.relation(&self_link, "Sensor")),
        thing_link: Some(ctx.links.relation(&self_link, "Thing")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Observations") {
        let list = history::datastream_observations(
            ctx,
            &expansions.settings_for("Observations"),
            rref,
            0,
            ctx.embedded_limit,
        )?;
        expand_into(&mut datastream.expansions, "Observations", &list)?;
    }
    if expansions.should_expand("ObservedProperty") {
        let op = to_observed_property(ctx, &expansions.settings_for("ObservedProperty"), rref)?;
        expand_into(&mut datastream.expansions, "ObservedProperty", &op)?;
    }
    if expansions.should_expand("Sensor") {
        let sensor = to_sensor(ctx, &expansions.settings_for("Sensor"), rref)?;
        expand_into(&mut datastream.expansions, "Sensor", &sensor)?;
    }
    if expansions.should_expand("Thing") {
        let thing = to_thing(ctx, &expansions.settings_for("Thing"), rref.provider)?;
        expand_into(&mut datastream.expansions, "Thing", &thing)?;
    }

    Ok(datastream)
}

/// Map a resource to a Sensor.
pub fn to_sensor(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    rref: ResourceRef<'_>,
) -> Result<Sensor> {
    let metadata = &rref.resource.metadata;
    let sensor_id = id::resource_id(&rref.provider.name, &rref.service.name, &rref.resource.name);

    let self_link = ctx.links.entity("Sensors", &sensor_id);
    let mut sensor = Sensor {
        id: Value::String(sensor_id),
        name: Some(
            metadata_string(metadata, FRIENDLY_NAME)
                .unwrap_or_else(|| rref.resource.name.clone()),
        ),
        description: Some(
            metadata_string(metadata, DESCRIPTION).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        ),
        metadata: Some(
            metadata
                .get(annotations::SENSOR_METADATA)
                .cloned()
                .unwrap_or_else(|| Value::String(NO_METADATA.to_string())),
        ),
        encoding_type: Some(
            metadata_string(metadata, annotations::SENSOR_ENCODING_TYPE)
                .unwrap_or_else(|| DEFAULT_ENCODING_TYPE.to_string()),
        ),
        properties: Some(metadata.clone()),
        datastreams_link: Some(ctx.links.relation(&self_link, "Datastreams")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Datastreams") {
        let list =
            provider_datastreams(ctx, &expansions.settings_for("Datastreams"), rref.provider)?;
        expand_into(&mut sensor.expansions, "Datastreams", &list)?;
    }

    Ok(sensor)
}

/// Map a resource to an ObservedProperty.
pub fn to_observed_property(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    rref: ResourceRef<'_>,
) -> Result<ObservedProperty> {
    let metadata = &rref.resource.metadata;
    let property_id = id::resource_id(&rref.provider.name, &rref.service.name, &rref.resource.name);

    let self_link = ctx.links.entity("ObservedProperties", &property_id);
    let mut observed_property = ObservedProperty {
        id: Value::String(property_id),
        name: Some(
            metadata_string(metadata, FRIENDLY_NAME)
                .unwrap_or_else(|| rref.resource.name.clone()),
        ),
        description: Some(
            metadata_string(metadata, DESCRIPTION).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        ),
        definition: Some(
            metadata_string(metadata, annotations::OBSERVED_PROPERTY_DEFINITION)
                .unwrap_or_else(|| NO_DEFINITION.to_string()),
        ),
        properties: Some(metadata.clone()),
        datastreams_link: Some(ctx.links.relation(&self_link, "Datastreams")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Datastreams") {
        let list =
            provider_datastreams(ctx, &expansions.settings_for("Datastreams"), rref.provider)?;
        expand_into(&mut observed_property.expansions, "Datastreams", &list)?;
    }

    Ok(observed_property)
}

/// Map a resource's timed value to an Observation.
///
/// With no explicit value the resource's live value is used; a resource
/// that was never set has no observation identity and maps to not-found.
pub fn to_observation(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    rref: ResourceRef<'_>,
    timed_value: Option<&TimedValue>,
) -> Result<Observation> {
    let live = rref.resource.value.as_ref();
    let timed = timed_value
        .or(live)
        .ok_or_else(|| GatewayError::NotFound("resource has no observation".to_string()))?;
    let timestamp = timed.timestamp;

    let observation_id = id::observation_id(
        &rref.provider.name,
        &rref.service.name,
        &rref.resource.name,
        timestamp,
    );
    let self_link = ctx.links.entity("Observations", &observation_id);
    let mut observation = Observation {
        id: Value::String(observation_id),
        phenomenon_time: Some(timestamp),
        result_time: Some(timestamp),
        result: Some(timed.value.clone()),
        result_quality: rref
            .resource
            .metadata
            .get(annotations::OBSERVATION_QUALITY)
            .cloned(),
        datastream_link: Some(ctx.links.relation(&self_link, "Datastream")),
        feature_of_interest_link: Some(ctx.links.relation(&self_link, "FeatureOfInterest")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Datastream") {
        let datastream = to_datastream(ctx, &expansions.settings_for("Datastream"), rref)?;
        expand_into(&mut observation.expansions, "Datastream", &datastream)?;
    }
    if expansions.should_expand("FeatureOfInterest") {
        let feature = to_feature_of_interest(
            ctx,
            &expansions.settings_for("FeatureOfInterest"),
            rref.provider,
        )?;
        expand_into(&mut observation.expansions, "FeatureOfInterest", &feature)?;
    }

    Ok(observation)
}

/// Map a provider to a FeatureOfInterest.
pub fn to_feature_of_interest(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
) -> Result<FeatureOfInterest> {
    let located = provider_location(provider, false)?;
    let geo = located.geo.unwrap_or_else(GeoJson::empty_point);

    let name = geojson::feature_property(&geo, "name");
    let description = geojson::feature_property(&geo, DESCRIPTION);

    let self_link = ctx.links.entity("FeaturesOfInterest", &provider.name);
    let mut feature_of_interest = FeatureOfInterest {
        id: Value::String(provider.name.clone()),
        name: Some(name.unwrap_or_else(|| provider.name.clone())),
        description: Some(description.unwrap_or_else(|| NO_DESCRIPTION.to_string())),
        encoding_type: Some(ENCODING_TYPE_VND_GEO_JSON.to_string()),
        feature: Some(geo),
        observations_link: Some(ctx.links.relation(&self_link, "Observations")),
        self_link: Some(self_link),
        ..Default::default()
    };

    if expansions.should_expand("Observations") {
        let list = live_observations(ctx, &expansions.settings_for("Observations"), provider)?;
        expand_into(&mut feature_of_interest.expansions, "Observations", &list)?;
    }

    Ok(feature_of_interest)
}

/// The resources of a provider that back datastreams: every set resource
/// outside the admin service.
pub fn datastream_refs(provider: &ProviderSnapshot) -> impl Iterator<Item = ResourceRef<'_>> {
    provider
        .resource_refs()
        .filter(|r| r.service.name != ADMIN_SERVICE)
        .filter(|r| r.resource.is_set())
}

/// Every datastream of a provider as a result list.
pub fn provider_datastreams(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
) -> Result<ResultList<Datastream>> {
    let mut datastreams = Vec::new();
    for rref in datastream_refs(provider) {
        datastreams.push(to_datastream(ctx, expansions, rref)?);
    }
    Ok(ResultList::of(datastreams))
}

/// The live observation of every set resource of a provider.
pub fn live_observations(
    ctx: MapperContext<'_>,
    expansions: &ExpansionSettings,
    provider: &ProviderSnapshot,
) -> Result<ResultList<Observation>> {
    let mut observations = Vec::new();
    for rref in datastream_refs(provider) {
        observations.push(to_observation(ctx, expansions, rref, None)?);
    }
    Ok(ResultList::of(observations))
}

/// Live observation identity matching: an id addresses the live value only
/// when its encoded timestamp equals the live timestamp at millisecond
/// precision.
pub fn matches_live(requested: DateTime<Utc>, live: &TimedValue) -> bool {
    truncate_to_millis(requested) == live.milli_timestamp()
}
