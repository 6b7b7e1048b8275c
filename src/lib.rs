//! # OpenAPI Gateway
//!
//! A token-issuing API gateway: authenticates callers with HMAC-signed
//! JWTs, resolves `/api/<service>/**` paths against a periodically
//! refreshed routing table, and reverse-proxies matched requests to
//! the resolved backend.
//!
//! ## Architecture
//!
//! ```text
//! Listener → Pipeline (global stage, auth gate) → Local endpoints → Routing Table → Forwarding Engine → Backend
//! ```
//!
//! ## Core Features
//!
//! - **Token issuance**: `/auth/token` exchanges app credentials for a
//!   signed bearer token; `/auth/validate` inspects one
//! - **Authenticated proxying**: every `/api/**` request outside the
//!   bypass prefixes must carry a valid token
//! - **Prefix routing**: `/api/<service>/**` patterns, first match in
//!   table order wins, path rewritten to `/api/...` for the backend
//! - **Periodic discovery**: the routing table is swapped wholesale on
//!   a fixed schedule and never partially updated
//! - **SSE relay**: `text/event-stream` responses are streamed through
//!   instead of buffered
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use openapi_gateway::{config::GatewayConfig, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> openapi_gateway::Result<()> {
//!     let config = GatewayConfig::from_file("gateway.hcl").await?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.start().await?;
//!     gateway.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub(crate) mod endpoints;
pub(crate) mod entrypoint;
pub mod envelope;
pub mod error;
pub mod gateway;
pub(crate) mod middleware;
pub mod provider;
pub(crate) mod proxy;
pub(crate) mod router;

// Re-export main types
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use provider::{DiscoverySource, ServiceRoute};

use serde::{Deserialize, Serialize};

/// Gateway runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GatewayState {
    /// Gateway has been created but not yet started
    #[default]
    Created,
    /// Gateway is initializing the listener and loading configuration
    Starting,
    /// Gateway is actively accepting and proxying requests
    Running,
    /// Gateway is shutting down
    Stopping,
    /// Gateway has fully stopped
    Stopped,
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
