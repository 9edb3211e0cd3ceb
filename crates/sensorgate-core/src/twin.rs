//! Session and update gateways over the digital twin
//!
//! `TwinSession` is the read side: it hands out snapshots. `DataUpdate` is
//! the write side: it applies flattened provider/resource updates produced
//! by the northbound layer. Reads are synchronous against the in-memory
//! twin; each request takes whatever snapshot state exists at that instant.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use sensorgate_common::{GatewayError, Result};

use crate::snapshot::{ProviderSnapshot, ResourceSnapshot, ServiceSnapshot, TimedValue};
use crate::{ADMIN_SERVICE, DESCRIPTION, FRIENDLY_NAME, LOCATION};

/// Read access to the digital twin
pub trait TwinSession: Send + Sync {
    /// Snapshot every known provider
    fn list_providers(&self) -> Vec<ProviderSnapshot>;

    /// Snapshot one provider by name
    fn provider(&self, name: &str) -> Option<ProviderSnapshot>;
}

/// Flattened update for a provider and its admin fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderUpdate {
    /// Provider to create or update
    pub provider_id: String,

    /// New admin friendlyName value
    pub friendly_name: Option<String>,

    /// New admin description value
    pub description: Option<String>,

    /// New admin location value (GeoJSON)
    pub location: Option<Value>,

    /// Additional admin metadata entries
    pub properties: Map<String, Value>,
}

/// Flattened update for a single resource value and its metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUpdate {
    pub provider: String,
    pub service: String,
    pub resource: String,

    /// New value; `None` leaves the current value untouched
    pub value: Option<Value>,

    /// Timestamp of the new value; defaults to now when absent
    pub timestamp: Option<DateTime<Utc>>,

    /// Metadata entries merged into the resource metadata
    pub metadata: Map<String, Value>,
}

/// Write access to the digital twin
pub trait DataUpdate: Send + Sync {
    /// Create or update a provider and its admin fields
    fn apply_provider_update(&self, update: ProviderUpdate) -> Result<()>;

    /// Create or update a resource value with its metadata
    fn apply_resource_update(&self, update: ResourceUpdate) -> Result<()>;

    /// Remove a provider entirely
    fn delete_provider(&self, name: &str) -> Result<()>;

    /// Remove one resource
    fn delete_resource(&self, provider: &str, service: &str, resource: &str) -> Result<()>;
}

/// In-memory digital twin, the gateway's live model
///
/// Providers are kept in a concurrent map; readers snapshot by cloning, so
/// mapping never observes a half-applied update. Last writer wins on
/// concurrent updates to the same resource.
#[derive(Debug, Default)]
pub struct InMemoryTwin {
    providers: RwLock<HashMap<String, ProviderSnapshot>>,
}

impl InMemoryTwin {
    /// Create an empty twin
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the twin with a prebuilt provider snapshot
    pub fn insert_provider(&self, provider: ProviderSnapshot) {
        self.providers
            .write()
            .expect("twin lock poisoned")
            .insert(provider.name.clone(), provider);
    }
}

impl TwinSession for InMemoryTwin {
    fn list_providers(&self) -> Vec<ProviderSnapshot> {
        let guard = self.providers.read().expect("twin lock poisoned");
        let mut providers: Vec<ProviderSnapshot> = guard.values().cloned().collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        providers
    }

    fn provider(&self, name: &str) -> Option<ProviderSnapshot> {
        self.providers
            .read()
            .expect("twin lock poisoned")
            .get(name)
            .cloned()
    }
}

fn set_resource(
    provider: &mut ProviderSnapshot,
    service: &str,
    resource: &str,
    value: Option<Value>,
    timestamp: DateTime<Utc>,
    metadata: &Map<String, Value>,
) {
    if provider.service(service).is_none() {
        provider.services.push(ServiceSnapshot::new(service));
    }
    let svc = provider
        .services
        .iter_mut()
        .find(|s| s.name == service)
        .expect("service just inserted");
    if svc.resource(resource).is_none() {
        svc.resources.push(ResourceSnapshot::new(resource));
    }
    let rc = svc
        .resources
        .iter_mut()
        .find(|r| r.name == resource)
        .expect("resource just inserted");
    for (k, v) in metadata {
        rc.metadata.insert(k.clone(), v.clone());
    }
    if let Some(value) = value {
        rc.value = Some(TimedValue::new(value, timestamp));
    }
}

impl DataUpdate for InMemoryTwin {
    fn apply_provider_update(&self, update: ProviderUpdate) -> Result<()> {
        debug!(provider = %update.provider_id, "applying provider update");
        let mut guard = self.providers.write().expect("twin lock poisoned");
        let provider = guard
            .entry(update.provider_id.clone())
            .or_insert_with(|| ProviderSnapshot::new(&update.provider_id));

        let now = Utc::now();
        let empty = Map::new();
        if let Some(name) = update.friendly_name {
            set_resource(provider, ADMIN_SERVICE, FRIENDLY_NAME, Some(Value::String(name)), now, &empty);
        }
        if let Some(description) = update.description {
            set_resource(provider, ADMIN_SERVICE, DESCRIPTION, Some(Value::String(description)), now, &empty);
        }
        if let Some(location) = update.location {
            set_resource(provider, ADMIN_SERVICE, LOCATION, Some(location), now, &empty);
        }
        for (key, value) in update.properties {
            set_resource(provider, ADMIN_SERVICE, &key, Some(value), now, &empty);
        }
        Ok(())
    }

    fn apply_resource_update(&self, update: ResourceUpdate) -> Result<()> {
        debug!(
            provider = %update.provider,
            service = %update.service,
            resource = %update.resource,
            "applying resource update"
        );
        let mut guard = self.providers.write().expect("twin lock poisoned");
        let provider = guard
            .entry(update.provider.clone())
            .or_insert_with(|| ProviderSnapshot::new(&update.provider));
        let timestamp = update.timestamp.unwrap_or_else(Utc::now);
        set_resource(
            provider,
            &update.service,
            &update.resource,
            update.value,
            timestamp,
            &update.metadata,
        );
        Ok(())
    }

    fn delete_provider(&self, name: &str) -> Result<()> {
        let mut guard = self.providers.write().expect("twin lock poisoned");
        guard
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {name}")))
    }

    fn delete_resource(&self, provider: &str, service: &str, resource: &str) -> Result<()> {
        let mut guard = self.providers.write().expect("twin lock poisoned");
        let snapshot = guard
            .get_mut(provider)
            .ok_or_else(|| GatewayError::NotFound(format!("unknown provider {provider}")))?;
        let svc = snapshot
            .services
            .iter_mut()
            .find(|s| s.name == service)
            .ok_or_else(|| GatewayError::NotFound(format!("unknown service {service}")))?;
        let before = svc.resources.len();
        svc.resources.retain(|r| r.name != resource);
        if svc.resources.len() == before {
            return Err(GatewayError::NotFound(format!("unknown resource {resource}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_provider_update_creates_admin_fields() {
        let twin = InMemoryTwin::new();
        twin.apply_provider_update(ProviderUpdate {
            provider_id: "station-1".to_string(),
            friendly_name: Some("Station One".to_string()),
            description: Some("Roof sensor cluster".to_string()),
            location: Some(json!({"type": "Point", "coordinates": [5.7, 45.2]})),
            properties: Map::new(),
        })
        .unwrap();

        let provider = twin.provider("station-1").unwrap();
        let admin = provider.service(ADMIN_SERVICE).unwrap();
        assert_eq!(
            admin.resource(FRIENDLY_NAME).unwrap().value.as_ref().unwrap().value,
            json!("Station One")
        );
        assert!(admin.resource(LOCATION).unwrap().is_set());
    }

    #[test]
    fn test_resource_update_merges_metadata() {
        let twin = InMemoryTwin::new();
        let mut metadata = Map::new();
        metadata.insert("unit".to_string(), json!("°C"));
        twin.apply_resource_update(ResourceUpdate {
            provider: "station-1".to_string(),
            service: "sensors".to_string(),
            resource: "temperature".to_string(),
            value: Some(json!(21.5)),
            timestamp: None,
            metadata,
        })
        .unwrap();

        let provider = twin.provider("station-1").unwrap();
        let rref = provider.resource("sensors", "temperature").unwrap();
        assert_eq!(rref.resource.metadata_value("unit"), Some(&json!("°C")));
        assert_eq!(rref.resource.value.as_ref().unwrap().value, json!(21.5));
    }

    #[test]
    fn test_delete_semantics() {
        let twin = InMemoryTwin::new();
        twin.apply_resource_update(ResourceUpdate {
            provider: "p".to_string(),
            service: "s".to_string(),
            resource: "r".to_string(),
            value: Some(json!(1)),
            timestamp: None,
            metadata: Map::new(),
        })
        .unwrap();

        twin.delete_resource("p", "s", "r").unwrap();
        assert!(matches!(
            twin.delete_resource("p", "s", "r"),
            Err(GatewayError::NotFound(_))
        ));
        twin.delete_provider("p").unwrap();
        assert!(twin.provider("p").is_none());
    }

    #[test]
    fn test_list_providers_sorted() {
        let twin = InMemoryTwin::new();
        twin.insert_provider(ProviderSnapshot::new("zeta"));
        twin.insert_provider(ProviderSnapshot::new("alpha"));
        let names: Vec<String> = twin.list_providers().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
