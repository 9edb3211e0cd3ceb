//! Shared request state
//!
//! Everything a handler needs: the twin session and update gateway, the
//! optional history backend, the synthetic-entity stores, link
//! construction and pagination limits. All pieces are injected; nothing is
//! ambient static state.

use std::sync::Arc;

use sensorgate_core::config::ApiConfig;
use sensorgate_core::{DataUpdate, HistoryProvider, TwinSession};
use sensorgate_sensorthings::dto::{FeatureOfInterest, ObservedProperty, Sensor};
use sensorgate_sensorthings::mapper::{LinkBase, MapperContext};
use sensorgate_sensorthings::store::MemoryDtoStore;

/// Pagination limits by endpoint class.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    /// Default page size for collection listings.
    pub page_size: usize,
    /// Page size for observation history listings.
    pub history_page_size: usize,
    /// Observations embedded per `$expand`.
    pub embedded_observations: usize,
}

/// State shared across all request handlers.
#[derive(Clone)]
pub struct ApiState {
    pub session: Arc<dyn TwinSession>,
    pub updates: Arc<dyn DataUpdate>,
    pub history: Option<Arc<dyn HistoryProvider>>,
    pub sensors: Arc<MemoryDtoStore<Sensor>>,
    pub observed_properties: Arc<MemoryDtoStore<ObservedProperty>>,
    pub features_of_interest: Arc<MemoryDtoStore<FeatureOfInterest>>,
    pub links: LinkBase,
    pub limits: PageLimits,
}

impl ApiState {
    /// Assemble the state from configuration and the twin backends.
    pub fn new(
        config: &ApiConfig,
        session: Arc<dyn TwinSession>,
        updates: Arc<dyn DataUpdate>,
        history: Option<Arc<dyn HistoryProvider>>,
    ) -> Self {
        Self {
            session,
            updates,
            history,
            sensors: Arc::new(MemoryDtoStore::new()),
            observed_properties: Arc::new(MemoryDtoStore::new()),
            features_of_interest: Arc::new(MemoryDtoStore::new()),
            links: LinkBase::new(&config.base_url),
            limits: PageLimits {
                page_size: config.page_size,
                history_page_size: config.history_page_size,
                embedded_observations: config.embedded_observations,
            },
        }
    }

    /// A mapper context borrowing this state for the current request.
    pub fn mapper(&self) -> MapperContext<'_> {
        MapperContext {
            session: self.session.as_ref(),
            history: self.history.as_deref(),
            links: &self.links,
            embedded_limit: self.limits.embedded_observations,
        }
    }
}
