//! History query interface
//!
//! Resources keep only their latest value in the twin; a history backend
//! stores the full time series. The northbound layer consults it when a
//! request addresses an observation older than the live value, and when
//! listing observation or location histories.
//!
//! Queries run synchronously on the request task with no retry or timeout
//! at this layer; a slow backend directly extends request latency.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use sensorgate_common::Result;

use crate::snapshot::TimedValue;

/// Query access to stored time series
pub trait HistoryProvider: Send + Sync {
    /// The latest stored value at or before `time`, if any
    fn get_single_value(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
        time: DateTime<Utc>,
    ) -> Result<Option<TimedValue>>;

    /// A page of stored values in ascending time order
    fn get_value_range(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<TimedValue>>;

    /// Number of stored values for the resource, when the backend can
    /// answer cheaply
    fn get_stored_value_count(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<Option<u64>>;
}

/// In-memory history backend backed by per-resource BTreeMap time series
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    series: RwLock<HashMap<(String, String, String), BTreeMap<DateTime<Utc>, Value>>>,
}

impl InMemoryHistory {
    /// Create an empty history store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one value in the series of a resource
    pub fn record(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
        time: DateTime<Utc>,
        value: Value,
    ) {
        let key = (provider.to_string(), service.to_string(), resource.to_string());
        self.series
            .write()
            .expect("history lock poisoned")
            .entry(key)
            .or_default()
            .insert(time, value);
    }
}

impl HistoryProvider for InMemoryHistory {
    fn get_single_value(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
        time: DateTime<Utc>,
    ) -> Result<Option<TimedValue>> {
        let guard = self.series.read().expect("history lock poisoned");
        let key = (provider.to_string(), service.to_string(), resource.to_string());
        let found = guard.get(&key).and_then(|series| {
            series
                .range(..=time)
                .next_back()
                .map(|(t, v)| TimedValue::new(v.clone(), *t))
        });
        Ok(found)
    }

    fn get_value_range(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<TimedValue>> {
        let guard = self.series.read().expect("history lock poisoned");
        let key = (provider.to_string(), service.to_string(), resource.to_string());
        let Some(series) = guard.get(&key) else {
            return Ok(Vec::new());
        };
        let values = series
            .iter()
            .filter(|(t, _)| from.map(|f| **t >= f).unwrap_or(true))
            .filter(|(t, _)| to.map(|u| **t <= u).unwrap_or(true))
            .skip(skip)
            .take(limit)
            .map(|(t, v)| TimedValue::new(v.clone(), *t))
            .collect();
        Ok(values)
    }

    fn get_stored_value_count(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<Option<u64>> {
        let guard = self.series.read().expect("history lock poisoned");
        let key = (provider.to_string(), service.to_string(), resource.to_string());
        Ok(guard.get(&key).map(|series| series.len() as u64))
    }
}
