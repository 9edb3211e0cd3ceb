// =============================================================================
// sensorgate - IoT Digital-Twin Gateway Entry Point
// =============================================================================
//
// Boots the gateway: configuration (TOML + environment), structured logging,
// the in-memory digital twin with its history recorder, and the SensorThings
// v1.1 northbound API served over axum.
//
// Runtime:
//   • SENSORGATE_CONFIG environment variable pointing to a TOML config file
//     (optional; defaults apply without it)
//   • SENSORGATE_-prefixed variables override individual settings, e.g.
//     SENSORGATE_SERVER__PORT=9090
//
// =============================================================================

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sensorgate_api::ApiState;
use sensorgate_core::twin::{ProviderUpdate, ResourceUpdate};
use sensorgate_core::{DataUpdate, GatewayConfig, HistoryProvider, InMemoryHistory, InMemoryTwin};

/// Write gateway that mirrors every applied value into the history store,
/// so older observations stay addressable after the live value moves on.
struct RecordingUpdate {
    twin: Arc<InMemoryTwin>,
    history: Arc<InMemoryHistory>,
}

impl DataUpdate for RecordingUpdate {
    fn apply_provider_update(&self, update: ProviderUpdate) -> sensorgate_common::Result<()> {
        if let Some(location) = &update.location {
            self.history.record(
                &update.provider_id,
                sensorgate_core::ADMIN_SERVICE,
                sensorgate_core::LOCATION,
                chrono::Utc::now(),
                location.clone(),
            );
        }
        self.twin.apply_provider_update(update)
    }

    fn apply_resource_update(&self, update: ResourceUpdate) -> sensorgate_common::Result<()> {
        if let Some(value) = &update.value {
            self.history.record(
                &update.provider,
                &update.service,
                &update.resource,
                update.timestamp.unwrap_or_else(chrono::Utc::now),
                value.clone(),
            );
        }
        self.twin.apply_resource_update(update)
    }

    fn delete_provider(&self, name: &str) -> sensorgate_common::Result<()> {
        self.twin.delete_provider(name)
    }

    fn delete_resource(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> sensorgate_common::Result<()> {
        self.twin.delete_resource(provider, service, resource)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::var_os("SENSORGATE_CONFIG").map(PathBuf::from);
    let config = GatewayConfig::load(config_path.as_deref()).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone())),
        )
        .init();

    info!(
        name = %config.server.name,
        version = env!("CARGO_PKG_VERSION"),
        "starting sensorgate"
    );

    let twin = Arc::new(InMemoryTwin::new());
    let (updates, history): (Arc<dyn DataUpdate>, Option<Arc<dyn HistoryProvider>>) =
        if config.history.enabled {
            let history = Arc::new(InMemoryHistory::new());
            let recorder = Arc::new(RecordingUpdate {
                twin: twin.clone(),
                history: history.clone(),
            });
            (recorder, Some(history))
        } else {
            (twin.clone(), None)
        };

    let state = ApiState::new(&config.api, twin.clone(), updates, history);
    let app = sensorgate_api::router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, base_url = %config.api.base_url, "northbound API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving northbound API")?;

    Ok(())
}
