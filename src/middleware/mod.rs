//! Middleware chain applied to every inbound request.
//!
//! Stages run in a fixed order composed at startup. The request phase
//! walks the chain forward; a stage may short-circuit with a response,
//! which stops the chain. The response phase walks the chain in
//! reverse on every outcome, including short-circuits and errors.

pub mod auth;
pub mod global;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use http::Response;

use crate::error::Result;

pub use auth::AuthGate;
pub use global::GlobalStage;

/// Caller-supplied correlation id header
pub const REQUEST_ID_HEADER: &str = "X-Request-Unique-Id";

/// Per-request state shared by the pipeline stages
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id, caller-supplied or generated
    pub request_id: String,
    /// Client address, favoring proxy headers over the socket peer
    pub client_ip: String,
    pub user_agent: String,
    pub method: http::Method,
    /// Path only, used for prefix checks
    pub path: String,
    /// Path plus query, used for logging
    pub uri: String,
    /// Wall-clock request time, stamped into `X-Request-Time`
    pub request_time: String,
    pub started: Instant,
}

impl RequestContext {
    pub fn new(parts: &http::request::Parts, remote_addr: SocketAddr) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let user_agent = parts
            .headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        Self {
            request_id,
            client_ip: client_ip(parts, remote_addr),
            user_agent,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            uri,
            request_time: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            started: Instant::now(),
        }
    }

    /// Milliseconds since the request arrived.
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Client IP resolution: first hop of X-Forwarded-For, then X-Real-IP,
/// then the socket peer address.
fn client_ip(parts: &http::request::Parts, remote_addr: SocketAddr) -> String {
    if let Some(forwarded) = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = parts
        .headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return real_ip.to_string();
    }

    remote_addr.ip().to_string()
}

/// One stage of the request pipeline
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process a request before it reaches routing.
    ///
    /// Returns `Some(response)` to short-circuit the chain, `None` to
    /// pass the (possibly mutated) request onward.
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>>;

    /// Process response parts before they are written to the caller.
    async fn handle_response(
        &self,
        _resp: &mut http::response::Parts,
        _ctx: &RequestContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Stage name for logging
    fn name(&self) -> &str;
}

/// Ordered middleware chain
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Run the request phase. The first stage returning a response
    /// short-circuits the rest of the chain.
    pub async fn process_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        for stage in &self.stages {
            if let Some(response) = stage.handle_request(req, ctx).await? {
                tracing::debug!(
                    stage = stage.name(),
                    request_id = %ctx.request_id,
                    "Stage short-circuited request"
                );
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Run the response phase in reverse stage order.
    pub async fn process_response(
        &self,
        resp: &mut http::response::Parts,
        ctx: &RequestContext,
    ) -> Result<()> {
        for stage in self.stages.iter().rev() {
            stage.handle_response(resp, ctx).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn test_parts(path: &str) -> http::request::Parts {
        let (parts, _) = http::Request::builder()
            .method(http::Method::GET)
            .uri(path)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn test_ctx(parts: &http::request::Parts) -> RequestContext {
        RequestContext::new(parts, "127.0.0.1:9999".parse().unwrap())
    }

    struct Pass {
        touched: AtomicBool,
    }

    #[async_trait]
    impl Middleware for Pass {
        async fn handle_request(
            &self,
            _req: &mut http::request::Parts,
            _ctx: &RequestContext,
        ) -> Result<Option<Response<Vec<u8>>>> {
            self.touched.store(true, Ordering::SeqCst);
            Ok(None)
        }

        fn name(&self) -> &str {
            "pass"
        }
    }

    struct Reject;

    #[async_trait]
    impl Middleware for Reject {
        async fn handle_request(
            &self,
            _req: &mut http::request::Parts,
            _ctx: &RequestContext,
        ) -> Result<Option<Response<Vec<u8>>>> {
            Ok(Some(
                Response::builder()
                    .status(http::StatusCode::UNAUTHORIZED)
                    .body(Vec::new())
                    .unwrap(),
            ))
        }

        fn name(&self) -> &str {
            "reject"
        }
    }

    struct Recorder {
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle_request(
            &self,
            _req: &mut http::request::Parts,
            _ctx: &RequestContext,
        ) -> Result<Option<Response<Vec<u8>>>> {
            Ok(None)
        }

        async fn handle_response(
            &self,
            _resp: &mut http::response::Parts,
            _ctx: &RequestContext,
        ) -> Result<()> {
            self.order.lock().unwrap().push(self.label);
            Ok(())
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    #[tokio::test]
    async fn test_all_stages_pass() {
        let pipeline = Pipeline::new(vec![
            Arc::new(Pass { touched: AtomicBool::new(false) }),
            Arc::new(Pass { touched: AtomicBool::new(false) }),
        ]);
        let mut parts = test_parts("/api/x");
        let ctx = test_ctx(&parts);
        let result = pipeline.process_request(&mut parts, &ctx).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_stages() {
        let later = Arc::new(Pass { touched: AtomicBool::new(false) });
        let pipeline = Pipeline::new(vec![Arc::new(Reject), later.clone()]);
        let mut parts = test_parts("/api/x");
        let ctx = test_ctx(&parts);

        let response = pipeline
            .process_request(&mut parts, &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
        assert!(!later.touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_response_phase_runs_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Arc::new(Recorder { label: "first", order: order.clone() }),
            Arc::new(Recorder { label: "second", order: order.clone() }),
        ]);
        let parts = test_parts("/api/x");
        let ctx = test_ctx(&parts);

        let (mut resp_parts, _) = Response::new(Vec::<u8>::new()).into_parts();
        pipeline
            .process_response(&mut resp_parts, &ctx)
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn test_context_uses_supplied_request_id() {
        let (parts, _) = http::Request::builder()
            .uri("/api/x")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = test_ctx(&parts);
        assert_eq!(ctx.request_id, "req-42");
    }

    #[test]
    fn test_context_generates_id_when_blank() {
        let (parts, _) = http::Request::builder()
            .uri("/api/x")
            .header(REQUEST_ID_HEADER, "  ")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = test_ctx(&parts);
        assert!(!ctx.request_id.trim().is_empty());
        assert_ne!(ctx.request_id, "  ");
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let (parts, _) = http::Request::builder()
            .uri("/api/x")
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "198.51.100.2")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = test_ctx(&parts);
        assert_eq!(ctx.client_ip, "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_peer() {
        let (parts, _) = http::Request::builder()
            .uri("/api/x")
            .header("X-Real-IP", "198.51.100.2")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = test_ctx(&parts);
        assert_eq!(ctx.client_ip, "198.51.100.2");

        let (parts, _) = http::Request::builder()
            .uri("/api/x")
            .body(())
            .unwrap()
            .into_parts();
        let ctx = test_ctx(&parts);
        assert_eq!(ctx.client_ip, "127.0.0.1");
    }
}
