//! Gateway configuration: HCL parsing, defaults, and validation.
//!
//! Example configuration:
//!
//! ```hcl
//! listen = "0.0.0.0:8000"
//!
//! jwt {
//!   secret      = "change-me-to-a-secret-of-at-least-32-bytes"
//!   expiry_secs = 604800
//!   issuer      = "openapi-service"
//! }
//!
//! discovery {
//!   initial_delay_secs = 5
//!   poll_interval_secs = 600
//!
//!   routes = [
//!     { pattern = "/api/service-a/**", target = "http://localhost:8081" },
//!     { pattern = "/api/service-b/**", target = "http://localhost:8082" },
//!   ]
//! }
//!
//! forward {
//!   max_body_bytes = 10485760
//! }
//!
//! apps = [
//!   { app_id = "demo-app", app_secret = "demo-secret", app_name = "Demo App" },
//! ]
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::auth::jwt::MIN_SECRET_BYTES;
use crate::error::{GatewayError, Result};

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address for the HTTP entrypoint
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Token signing and validation settings
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Routing table refresh settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Outbound forwarding settings
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Applications allowed to obtain tokens
    #[serde(default)]
    pub apps: Vec<AppCredentialConfig>,
}

/// JWT settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC signing secret, 32 bytes minimum
    #[serde(default)]
    pub secret: String,

    /// Token lifetime in seconds
    #[serde(default = "default_jwt_expiry")]
    pub expiry_secs: u64,

    /// Issuer claim stamped into every token
    #[serde(default = "default_jwt_issuer")]
    pub issuer: String,
}

/// Discovery refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Delay before the first refresh
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Interval between refreshes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Static service routes, used when no endpoint is configured.
    /// Order is significant: earlier entries win on overlapping patterns.
    #[serde(default)]
    pub routes: Vec<RouteTargetConfig>,

    /// Optional discovery endpoint returning a JSON array of
    /// `{"pattern": ..., "target": ...}` objects
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// One path pattern mapped to a backend base URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTargetConfig {
    pub pattern: String,
    pub target: String,
}

/// Forwarding engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// Cap on buffered request and response bodies
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Optional total timeout for outbound calls. None leaves the
    /// transport defaults in place.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Credentials for one registered application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCredentialConfig {
    pub app_id: String,
    pub app_secret: String,
    pub app_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_jwt_expiry() -> u64 {
    604800
}

fn default_jwt_issuer() -> String {
    "openapi-service".to_string()
}

fn default_initial_delay() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    600
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_enabled() -> bool {
    true
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiry_secs: default_jwt_expiry(),
            issuer: default_jwt_issuer(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            poll_interval_secs: default_poll_interval(),
            routes: Vec::new(),
            endpoint: None,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            timeout_secs: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            jwt: JwtConfig::default(),
            discovery: DiscoveryConfig::default(),
            forward: ForwardConfig::default(),
            apps: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string.
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse HCL config: {}", e)))
    }

    /// Validate the configuration.
    ///
    /// Fails on an under-length JWT secret instead of substituting a
    /// default signing key.
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            GatewayError::Config(format!("Invalid listen address: {}", self.listen))
        })?;

        if self.jwt.secret.len() < MIN_SECRET_BYTES {
            return Err(GatewayError::Config(format!(
                "JWT secret must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                self.jwt.secret.len()
            )));
        }
        if self.jwt.expiry_secs == 0 {
            return Err(GatewayError::Config(
                "jwt.expiry_secs must be greater than zero".to_string(),
            ));
        }
        if self.jwt.issuer.is_empty() {
            return Err(GatewayError::Config("jwt.issuer must not be empty".to_string()));
        }

        if self.discovery.poll_interval_secs == 0 {
            return Err(GatewayError::Config(
                "discovery.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        for route in &self.discovery.routes {
            if !route.pattern.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "Route pattern must start with '/': {}",
                    route.pattern
                )));
            }
            if route.target.is_empty() {
                return Err(GatewayError::Config(format!(
                    "Route target must not be empty for pattern {}",
                    route.pattern
                )));
            }
        }

        if self.forward.max_body_bytes == 0 {
            return Err(GatewayError::Config(
                "forward.max_body_bytes must be greater than zero".to_string(),
            ));
        }

        for app in &self.apps {
            if app.app_id.is_empty() || app.app_secret.is_empty() {
                return Err(GatewayError::Config(
                    "apps entries require app_id and app_secret".to_string(),
                ));
            }
        }

        Ok(())
    }
}
