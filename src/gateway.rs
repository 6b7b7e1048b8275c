//! Gateway orchestrator: wires configuration, token auth, routing,
//! discovery and the HTTP listener into a single manageable unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::auth::{MemoryCredentialStore, TokenService};
use crate::config::GatewayConfig;
use crate::endpoints::LocalEndpoints;
use crate::entrypoint::{self, SharedState};
use crate::error::{GatewayError, Result};
use crate::middleware::{AuthGate, GlobalStage, Middleware, Pipeline};
use crate::provider::{spawn_refresh_task, DiscoverySource, HttpSource, StaticSource};
use crate::proxy::ForwardEngine;
use crate::router::RouteTable;
use crate::GatewayState;

/// The main Gateway type, coordinating all components
pub struct Gateway {
    config: GatewayConfig,
    state: Arc<RwLock<GatewayState>>,
    start_time: Instant,
    shutdown: Arc<AtomicBool>,
    /// Active background task handles (listener + discovery refresh)
    handles: RwLock<Vec<tokio::task::JoinHandle<()>>>,
}

impl Gateway {
    /// Create a new gateway from configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(GatewayState::Created)),
            start_time: Instant::now(),
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: RwLock::new(Vec::new()),
        })
    }

    /// Start the gateway: bind the listener and begin accepting
    /// connections. The routing table starts empty and fills on the
    /// first discovery refresh.
    pub async fn start(&self) -> Result<()> {
        self.set_state(GatewayState::Starting);

        let addr: std::net::SocketAddr = self.config.listen.parse().map_err(|e| {
            GatewayError::Config(format!(
                "Invalid listen address '{}': {}",
                self.config.listen, e
            ))
        })?;

        let tokens = Arc::new(TokenService::new(&self.config.jwt)?);
        let credentials = Arc::new(MemoryCredentialStore::new(self.config.apps.clone()));
        tracing::info!(apps = credentials.len(), "Credential store loaded");

        let route_table = Arc::new(RouteTable::new());

        let pipeline = Pipeline::new(vec![
            Arc::new(GlobalStage::new()) as Arc<dyn Middleware>,
            Arc::new(AuthGate::new(tokens.clone())),
        ]);

        let state = Arc::new(SharedState {
            route_table: route_table.clone(),
            endpoints: LocalEndpoints::new(tokens, credentials),
            engine: ForwardEngine::new(&self.config.forward),
            pipeline,
            max_inbound_bytes: self.config.forward.max_body_bytes,
        });

        let source: Arc<dyn DiscoverySource> = match &self.config.discovery.endpoint {
            Some(endpoint) => Arc::new(HttpSource::new(endpoint.clone())),
            None => Arc::new(StaticSource::new(&self.config.discovery.routes)),
        };

        let refresh_handle =
            spawn_refresh_task(source, route_table.clone(), &self.config.discovery);
        let listener_handle = entrypoint::start_listener(addr, state).await?;

        {
            let mut handles = self.handles.write().unwrap();
            *handles = vec![refresh_handle, listener_handle];
        }

        self.set_state(GatewayState::Running);
        tracing::info!("Gateway is running");

        Ok(())
    }

    /// Initiate graceful shutdown
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return; // Already shutting down
        }

        self.set_state(GatewayState::Stopping);
        tracing::info!("Gateway shutting down");

        let mut handles = self.handles.write().unwrap();
        for handle in handles.drain(..) {
            handle.abort();
        }

        self.set_state(GatewayState::Stopped);
        tracing::info!("Gateway stopped");
    }

    /// Wait for a shutdown signal (Ctrl+C)
    pub async fn wait_for_shutdown(&self) {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        self.shutdown().await;
    }

    /// Get the current gateway state
    pub fn state(&self) -> GatewayState {
        self.state.read().unwrap().clone()
    }

    /// Get the current configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Uptime in seconds since construction
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if the gateway is running
    pub fn is_running(&self) -> bool {
        self.state() == GatewayState::Running
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn set_state(&self, new_state: GatewayState) {
        let mut state = self.state.write().unwrap();
        tracing::debug!(from = %*state, to = %new_state, "State transition");
        *state = new_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn minimal_config() -> GatewayConfig {
        GatewayConfig {
            listen: "127.0.0.1:0".to_string(),
            jwt: JwtConfig {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
                ..JwtConfig::default()
            },
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_gateway_new() {
        let gw = Gateway::new(minimal_config()).unwrap();
        assert_eq!(gw.state(), GatewayState::Created);
        assert!(!gw.is_running());
        assert!(!gw.is_shutdown());
    }

    #[test]
    fn test_gateway_new_rejects_short_secret() {
        let mut config = minimal_config();
        config.jwt.secret = "short".to_string();
        assert!(Gateway::new(config).is_err());
    }

    #[tokio::test]
    async fn test_gateway_start_and_shutdown() {
        let gw = Gateway::new(minimal_config()).unwrap();
        gw.start().await.unwrap();
        assert!(gw.is_running());

        gw.shutdown().await;
        assert!(gw.is_shutdown());
        assert_eq!(gw.state(), GatewayState::Stopped);
    }

    #[tokio::test]
    async fn test_gateway_double_shutdown() {
        let gw = Gateway::new(minimal_config()).unwrap();
        gw.shutdown().await;
        gw.shutdown().await; // Should not panic
        assert_eq!(gw.state(), GatewayState::Stopped);
    }

    #[tokio::test]
    async fn test_start_fails_on_bound_port() {
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = holder.local_addr().unwrap();

        let mut config = minimal_config();
        config.listen = addr.to_string();
        let gw = Gateway::new(config).unwrap();
        assert!(gw.start().await.is_err());
    }
}
