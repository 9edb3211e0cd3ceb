//! Snapshot types for the digital twin
//!
//! A snapshot is a read-only, point-in-time view of one provider with its
//! services, resources and current timed values. The SensorThings mapper
//! works exclusively against snapshots, so two mapper invocations over the
//! same snapshot always observe identical state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A value together with the instant it was set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    /// The raw value; dynamic, schemaless JSON
    pub value: Value,

    /// When the value was set
    pub timestamp: DateTime<Utc>,
}

impl TimedValue {
    /// Create a new timed value
    pub fn new(value: Value, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    /// The timestamp truncated to millisecond precision, the resolution
    /// composite ids are encoded at
    pub fn milli_timestamp(&self) -> DateTime<Utc> {
        truncate_to_millis(self.timestamp)
    }
}

/// Drop sub-millisecond precision from an instant.
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

/// Read-only view of one twin resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceSnapshot {
    /// Resource name, unique within its service
    pub name: String,

    /// Resource metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Current timed value, if the resource has ever been set
    pub value: Option<TimedValue>,
}

impl ResourceSnapshot {
    /// Create an unset resource
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            metadata: Map::new(),
            value: None,
        }
    }

    /// Whether the resource currently holds a value
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Metadata entry by key
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Read-only view of one twin service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceSnapshot {
    /// Service name, unique within its provider
    pub name: String,

    /// Resources of this service
    #[serde(default)]
    pub resources: Vec<ResourceSnapshot>,
}

impl ServiceSnapshot {
    /// Create an empty service
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resources: Vec::new(),
        }
    }

    /// Resource by name
    pub fn resource(&self, name: &str) -> Option<&ResourceSnapshot> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Read-only view of one twin provider, the digital representation of a
/// physical device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSnapshot {
    /// Provider name; must not contain `~`, which is reserved as the
    /// composite-id separator
    pub name: String,

    /// Model name of the provider, if any
    pub model: Option<String>,

    /// Services of this provider
    #[serde(default)]
    pub services: Vec<ServiceSnapshot>,
}

impl ProviderSnapshot {
    /// Create an empty provider
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: None,
            services: Vec::new(),
        }
    }

    /// Service by name
    pub fn service(&self, name: &str) -> Option<&ServiceSnapshot> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Resource by service and resource name
    pub fn resource(&self, service: &str, resource: &str) -> Option<ResourceRef<'_>> {
        let svc = self.service(service)?;
        let rc = svc.resource(resource)?;
        Some(ResourceRef {
            provider: self,
            service: svc,
            resource: rc,
        })
    }

    /// All resources of all services, with their enclosing context
    pub fn resource_refs(&self) -> impl Iterator<Item = ResourceRef<'_>> {
        self.services.iter().flat_map(move |svc| {
            svc.resources.iter().map(move |rc| ResourceRef {
                provider: self,
                service: svc,
                resource: rc,
            })
        })
    }
}

/// A resource together with its enclosing service and provider.
///
/// Mapper code needs to walk upwards from a resource to its provider; the
/// owned snapshot types have no parent pointers, so lookups hand out this
/// borrowed triple instead.
#[derive(Debug, Clone, Copy)]
pub struct ResourceRef<'a> {
    pub provider: &'a ProviderSnapshot,
    pub service: &'a ServiceSnapshot,
    pub resource: &'a ResourceSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_resource_lookup() {
        let mut provider = ProviderSnapshot::new("weather-1");
        let mut service = ServiceSnapshot::new("sensors");
        service.resources.push(ResourceSnapshot::new("temperature"));
        provider.services.push(service);

        let rref = provider.resource("sensors", "temperature").unwrap();
        assert_eq!(rref.provider.name, "weather-1");
        assert_eq!(rref.service.name, "sensors");
        assert_eq!(rref.resource.name, "temperature");
        assert!(!rref.resource.is_set());

        assert!(provider.resource("sensors", "humidity").is_none());
        assert!(provider.resource("other", "temperature").is_none());
    }

    #[test]
    fn test_resource_refs_walks_all_services() {
        let mut provider = ProviderSnapshot::new("p");
        for svc_name in ["admin", "sensors"] {
            let mut svc = ServiceSnapshot::new(svc_name);
            svc.resources.push(ResourceSnapshot::new("a"));
            svc.resources.push(ResourceSnapshot::new("b"));
            provider.services.push(svc);
        }
        assert_eq!(provider.resource_refs().count(), 4);
    }

    #[test]
    fn test_milli_truncation() {
        let precise = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let tv = TimedValue::new(json!(42), precise);
        let truncated = tv.milli_timestamp();
        assert_eq!(truncated.timestamp_subsec_millis(), 123);
        assert_eq!(truncated.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
