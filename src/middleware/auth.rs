//! Authentication gate: validates bearer tokens and annotates requests
//! with the caller's identity.
//!
//! Health checks under `/api/v1/` and the token endpoints under
//! `/auth/` bypass the gate; everything else needs a valid token
//! before routing can happen.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderValue, Response, StatusCode};

use crate::auth::TokenService;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::middleware::{Middleware, RequestContext};

/// Paths under these prefixes skip authentication
pub const BYPASS_PREFIXES: [&str; 2] = ["/api/v1/", "/auth/"];

/// Identity headers injected for downstream services
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";
pub const APP_NAME_HEADER: &str = "X-App-Name";

const USER_ROLE: &str = "app";

/// Stage 2 of the pipeline
pub struct AuthGate {
    tokens: Arc<TokenService>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    fn requires_auth(path: &str) -> bool {
        !BYPASS_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
    }

    /// 401 envelope. The message never says which check failed.
    fn unauthorized() -> Response<Vec<u8>> {
        let body = Envelope::error(401, "Authentication failed, please provide valid credentials")
            .to_json();
        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(CONTENT_TYPE, "application/json;charset=UTF-8")
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .body(body.into_bytes())
            .unwrap()
    }
}

#[async_trait]
impl Middleware for AuthGate {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        if !Self::requires_auth(&ctx.path) {
            return Ok(None);
        }

        let token = req
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let token = match token {
            Some(token) => token,
            None => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %ctx.path,
                    "Authentication failed: missing or malformed Authorization header"
                );
                return Ok(Some(Self::unauthorized()));
            }
        };

        let identity = match self.tokens.identity(token) {
            Some(identity) => identity,
            None => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %ctx.path,
                    "Authentication failed: invalid or expired token"
                );
                return Ok(Some(Self::unauthorized()));
            }
        };

        let (app_id, app_name) = match (
            HeaderValue::from_str(&identity.app_id),
            HeaderValue::from_str(&identity.app_name),
        ) {
            (Ok(app_id), Ok(app_name)) => (app_id, app_name),
            _ => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    app_id = %identity.app_id,
                    "Authentication failed: identity is not header-safe"
                );
                return Ok(Some(Self::unauthorized()));
            }
        };

        // insert() replaces any caller-supplied identity headers.
        req.headers.insert(USER_ID_HEADER, app_id);
        req.headers.insert(USER_ROLE_HEADER, HeaderValue::from_static(USER_ROLE));
        req.headers.insert(APP_NAME_HEADER, app_name);

        tracing::debug!(
            request_id = %ctx.request_id,
            app_id = %identity.app_id,
            "Authentication succeeded"
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        "auth"
    }
}
