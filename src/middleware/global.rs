//! Global stage: request/response logging, correlation id echo, CORS
//! and timing headers on every response.
//!
//! Runs first on the request phase and therefore last on the response
//! phase, so the done-log carries the final status of every outcome,
//! auth rejections and normalized errors included.

use async_trait::async_trait;
use http::Response;

use crate::error::Result;
use crate::middleware::{Middleware, RequestContext, REQUEST_ID_HEADER};

/// Value of the `X-Service-Name` response header
pub const SERVICE_NAME: &str = "openapi-service";

const REQUEST_TIME_HEADER: &str = "X-Request-Time";
const SERVICE_NAME_HEADER: &str = "X-Service-Name";

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "*";
const CORS_MAX_AGE: &str = "3600";

/// Stage 1 of the pipeline
#[derive(Debug, Default)]
pub struct GlobalStage;

impl GlobalStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for GlobalStage {
    async fn handle_request(
        &self,
        _req: &mut http::request::Parts,
        ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        tracing::info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            uri = %ctx.uri,
            client_ip = %ctx.client_ip,
            user_agent = %ctx.user_agent,
            "Request started"
        );
        Ok(None)
    }

    async fn handle_response(
        &self,
        resp: &mut http::response::Parts,
        ctx: &RequestContext,
    ) -> Result<()> {
        let headers = &mut resp.headers;
        headers.insert(REQUEST_ID_HEADER, ctx.request_id.parse().unwrap());
        headers.insert(REQUEST_TIME_HEADER, ctx.request_time.parse().unwrap());
        headers.insert(SERVICE_NAME_HEADER, SERVICE_NAME.parse().unwrap());
        headers.insert("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN.parse().unwrap());
        headers.insert("Access-Control-Allow-Methods", CORS_ALLOW_METHODS.parse().unwrap());
        headers.insert("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS.parse().unwrap());
        headers.insert("Access-Control-Max-Age", CORS_MAX_AGE.parse().unwrap());

        tracing::info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            uri = %ctx.uri,
            status = resp.status.as_u16(),
            duration_ms = ctx.elapsed_ms() as u64,
            "Request done"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "global"
    }
}
