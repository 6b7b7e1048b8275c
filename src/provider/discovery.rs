//! Discovery sources and the periodic routing refresh.
//!
//! The refresh task is the routing table's only writer. Each cycle
//! asks the source for the full service list and swaps the table
//! wholesale; a failed cycle logs a warning and leaves the previous
//! routes serving traffic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DiscoveryConfig, RouteTargetConfig};
use crate::error::Result;
use crate::router::{RouteEntry, RouteTable};

/// One pattern/target pair yielded by a discovery source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRoute {
    pub pattern: String,
    pub target: String,
}

/// Supplies the current backend mapping.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Current pattern-to-target pairs, in routing precedence order.
    async fn current_services(&self) -> Result<Vec<ServiceRoute>>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Fixed mapping taken from the configuration file
pub struct StaticSource {
    routes: Vec<ServiceRoute>,
}

impl StaticSource {
    pub fn new(routes: &[RouteTargetConfig]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|r| ServiceRoute {
                    pattern: r.pattern.clone(),
                    target: r.target.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl DiscoverySource for StaticSource {
    async fn current_services(&self) -> Result<Vec<ServiceRoute>> {
        Ok(self.routes.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Remote mapping fetched as a JSON array of
/// `{"pattern": ..., "target": ...}` objects
pub struct HttpSource {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }
}

#[async_trait]
impl DiscoverySource for HttpSource {
    async fn current_services(&self) -> Result<Vec<ServiceRoute>> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Vec<ServiceRoute>>().await?)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Run one refresh cycle against the table.
pub async fn refresh_once(source: &dyn DiscoverySource, table: &RouteTable) {
    match source.current_services().await {
        Ok(services) => {
            let mut entries = Vec::with_capacity(services.len());
            for route in &services {
                match RouteEntry::compile(&route.pattern, &route.target) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        tracing::warn!(
                            pattern = %route.pattern,
                            error = %e,
                            "Skipping invalid route from discovery"
                        );
                    }
                }
            }
            let count = entries.len();
            table.replace(entries);
            tracing::info!(
                source = source.name(),
                routes = count,
                "Routing table refreshed"
            );
        }
        Err(e) => {
            tracing::warn!(
                source = source.name(),
                error = %e,
                "Discovery refresh failed, keeping existing routes"
            );
        }
    }
}

/// Spawn the periodic refresh task: initial delay, then a fixed period.
pub fn spawn_refresh_task(
    source: Arc<dyn DiscoverySource>,
    table: Arc<RouteTable>,
    config: &DiscoveryConfig,
) -> tokio::task::JoinHandle<()> {
    let initial_delay = Duration::from_secs(config.initial_delay_secs);
    let period = Duration::from_secs(config.poll_interval_secs);

    tokio::spawn(async move {
        tracing::info!(
            source = source.name(),
            initial_delay_secs = initial_delay.as_secs(),
            poll_interval_secs = period.as_secs(),
            "Discovery refresh task started"
        );
        tokio::time::sleep(initial_delay).await;
        loop {
            refresh_once(source.as_ref(), &table).await;
            tokio::time::sleep(period).await;
        }
    })
}
