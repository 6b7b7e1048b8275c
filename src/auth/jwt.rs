//! JWT issuance and validation.
//!
//! Tokens are HMAC-SHA256 signed and stateless: validity is a pure
//! function of the signature and the current time, with no revocation
//! list. Parse failures are ordinary values so every failure kind can
//! be unit tested.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AppIdentity;
use crate::config::JwtConfig;
use crate::error::{GatewayError, Result};

/// Signing secrets shorter than this fail startup.
pub const MIN_SECRET_BYTES: usize = 32;

/// Remaining lifetime below which a token counts as near expiry.
pub const NEAR_EXPIRY_SECS: u64 = 3600;

/// Claims carried by every issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, always the appId
    pub sub: String,
    #[serde(rename = "appId")]
    pub app_id: String,
    #[serde(rename = "appName")]
    pub app_name: String,
    #[serde(rename = "type")]
    pub token_type: String,
    /// Issued-at, seconds since epoch
    pub iat: u64,
    /// Expiry, seconds since epoch
    pub exp: u64,
    /// Issuer
    pub iss: String,
}

/// Why a token failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("bad signature")]
    BadSignature,
    #[error("malformed token")]
    Malformed,
    #[error("token rejected")]
    Other,
}

/// A freshly signed token with its validity window
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates bearer tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiry_secs: u64,
    issuer: String,
}

impl TokenService {
    /// Create a token service from configuration.
    ///
    /// Rejects secrets shorter than [`MIN_SECRET_BYTES`] rather than
    /// substituting a default signing key.
    pub fn new(config: &JwtConfig) -> Result<Self> {
        if config.secret.len() < MIN_SECRET_BYTES {
            return Err(GatewayError::Config(format!(
                "JWT secret must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                config.secret.len()
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // Expiry checks are exact; a token with zero remaining seconds is invalid.
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            expiry_secs: config.expiry_secs,
            issuer: config.issuer.clone(),
        })
    }

    /// Issue a signed token for a validated application.
    pub fn issue(&self, app_id: &str, app_name: &str) -> Result<IssuedToken> {
        let issued_at = Utc::now();
        let iat = issued_at.timestamp().max(0) as u64;
        let exp = iat + self.expiry_secs;

        let claims = Claims {
            sub: app_id.to_string(),
            app_id: app_id.to_string(),
            app_name: app_name.to_string(),
            token_type: "access_token".to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::Other(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_in: self.expiry_secs,
            issued_at,
            expires_at: issued_at + chrono::Duration::seconds(self.expiry_secs as i64),
        })
    }

    /// Parse and verify a token.
    pub fn parse(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::Malformed,
                _ => AuthError::Other,
            })
    }

    /// True when the token parses, verifies, and has not expired.
    /// Never fails; reasons go to the debug log only.
    pub fn validate(&self, token: &str) -> bool {
        match self.parse(token) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Token validation failed");
                false
            }
        }
    }

    /// Identity carried by a valid token.
    pub fn identity(&self, token: &str) -> Option<AppIdentity> {
        self.parse(token).ok().map(|claims| AppIdentity {
            app_id: claims.app_id,
            app_name: claims.app_name,
        })
    }

    /// Seconds until expiry. Zero for expired or unparseable tokens.
    pub fn remaining_seconds(&self, token: &str) -> u64 {
        match self.parse(token) {
            Ok(claims) => {
                let now = Utc::now().timestamp().max(0) as u64;
                claims.exp.saturating_sub(now)
            }
            Err(_) => 0,
        }
    }

    /// True when the token expires within [`NEAR_EXPIRY_SECS`], or
    /// fails to parse. Fail-safe toward "treat as expiring".
    pub fn near_expiry(&self, token: &str) -> bool {
        match self.parse(token) {
            Ok(claims) => {
                let now = Utc::now().timestamp().max(0) as u64;
                claims.exp.saturating_sub(now) < NEAR_EXPIRY_SECS
            }
            Err(_) => true,
        }
    }

    /// Configured token lifetime in seconds.
    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }
}
