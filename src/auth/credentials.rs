//! Credential store boundary and the config-backed implementation.
//!
//! The gateway only ever asks one question of the store: does this
//! appId/appSecret pair belong to an enabled application. Persistence
//! lives behind the trait.

use async_trait::async_trait;

use crate::auth::AppIdentity;
use crate::config::AppCredentialConfig;

/// Validates application credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check an appId/appSecret pair, returning the identity when the
    /// pair matches an enabled application.
    async fn validate(&self, app_id: &str, app_secret: &str) -> Option<AppIdentity>;
}

/// In-memory store fed from the `apps` configuration section.
pub struct MemoryCredentialStore {
    apps: Vec<AppCredentialConfig>,
}

impl MemoryCredentialStore {
    pub fn new(apps: Vec<AppCredentialConfig>) -> Self {
        Self { apps }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn validate(&self, app_id: &str, app_secret: &str) -> Option<AppIdentity> {
        let app = match self.apps.iter().find(|a| a.app_id == app_id) {
            Some(app) => app,
            None => {
                tracing::warn!(app_id = %app_id, "Credential check failed: unknown app");
                return None;
            }
        };

        if !app.enabled {
            tracing::warn!(app_id = %app_id, "Credential check failed: app disabled");
            return None;
        }
        if app.app_secret != app_secret {
            tracing::warn!(app_id = %app_id, "Credential check failed: secret mismatch");
            return None;
        }

        tracing::info!(app_id = %app_id, "Application credentials validated");
        Some(AppIdentity {
            app_id: app.app_id.clone(),
            app_name: app.app_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryCredentialStore {
        MemoryCredentialStore::new(vec![
            AppCredentialConfig {
                app_id: "app-1".to_string(),
                app_secret: "secret-1".to_string(),
                app_name: "App One".to_string(),
                enabled: true,
            },
            AppCredentialConfig {
                app_id: "app-2".to_string(),
                app_secret: "secret-2".to_string(),
                app_name: "App Two".to_string(),
                enabled: false,
            },
        ])
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let identity = store().validate("app-1", "secret-1").await.unwrap();
        assert_eq!(identity.app_id, "app-1");
        assert_eq!(identity.app_name, "App One");
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        assert!(store().validate("app-1", "wrong").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_app_rejected() {
        assert!(store().validate("nobody", "secret-1").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_app_rejected() {
        assert!(store().validate("app-2", "secret-2").await.is_none());
    }
}
