//! Entrypoint: the HTTP listener that drives each request through the
//! pipeline, the local endpoints, the routing table and the
//! forwarding engine.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::endpoints::LocalEndpoints;
use crate::envelope::normalize_error;
use crate::error::{GatewayError, Result};
use crate::middleware::{Pipeline, RequestContext};
use crate::proxy::streaming::relay_body;
use crate::proxy::{full_body, ForwardEngine, ForwardedResponse, ProxyBody};
use crate::router::RouteTable;

/// Shared state for request handling
pub struct SharedState {
    pub route_table: Arc<RouteTable>,
    pub endpoints: LocalEndpoints,
    pub engine: ForwardEngine,
    pub pipeline: Pipeline,
    pub max_inbound_bytes: usize,
}

/// Bind the listening socket and start serving connections.
pub async fn start_listener(
    addr: SocketAddr,
    state: Arc<SharedState>,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Other(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(address = %addr, "Gateway listening");

    let handle = tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(|req| handle_request(req, remote_addr, state.clone())),
                    )
                    .await;
            });
        }
    });

    Ok(handle)
}

/// Handle an individual HTTP request
pub async fn handle_request(
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<SharedState>,
) -> std::result::Result<hyper::Response<ProxyBody>, hyper::Error> {
    let (mut parts, body) = req.into_parts();
    let ctx = RequestContext::new(&parts, remote_addr);

    let outcome = match collect_inbound(body, state.max_inbound_bytes).await {
        Ok(body_bytes) => dispatch(&mut parts, body_bytes, &ctx, &state).await,
        Err(err) => Err(err),
    };

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(
                request_id = %ctx.request_id,
                error = %err,
                "Request failed"
            );
            into_proxy_response(normalize_error(&err))
        }
    };

    // Response-phase stages run on every outcome, so the correlation
    // id and the CORS set are present even on failures.
    let (mut resp_parts, resp_body) = response.into_parts();
    if let Err(err) = state.pipeline.process_response(&mut resp_parts, &ctx).await {
        tracing::warn!(request_id = %ctx.request_id, error = %err, "Response stage error");
    }
    Ok(hyper::Response::from_parts(resp_parts, resp_body))
}

/// Run the request through the chain: pipeline stages, then local
/// endpoints, then routed forwarding.
async fn dispatch(
    parts: &mut http::request::Parts,
    body: Bytes,
    ctx: &RequestContext,
    state: &SharedState,
) -> Result<hyper::Response<ProxyBody>> {
    if let Some(response) = state.pipeline.process_request(parts, ctx).await? {
        return Ok(into_proxy_response(response));
    }

    if let Some(response) = state.endpoints.try_handle(parts, &body).await {
        return Ok(into_proxy_response(response));
    }

    let resolved = state
        .route_table
        .resolve(parts.uri.path(), parts.uri.query())
        .ok_or_else(|| GatewayError::Status {
            code: 404,
            reason: "Resource Not Found".to_string(),
        })?;

    tracing::info!(
        request_id = %ctx.request_id,
        pattern = %resolved.pattern,
        target = %resolved.url,
        "Forwarding request"
    );

    let forwarded = state
        .engine
        .forward(&parts.method, &resolved.url, &parts.headers, body)
        .await?;

    Ok(match forwarded {
        ForwardedResponse::Buffered {
            status,
            headers,
            body,
        } => {
            let mut builder = hyper::Response::builder().status(status);
            for (name, value) in headers.iter() {
                builder = builder.header(name, value);
            }
            builder.body(full_body(body)).unwrap()
        }
        ForwardedResponse::Streaming {
            status,
            headers,
            upstream,
        } => {
            let mut builder = hyper::Response::builder().status(status);
            for (name, value) in headers.iter() {
                builder = builder.header(name, value);
            }
            let mut response = builder
                .body(relay_body(upstream, ctx.request_id.clone()))
                .unwrap();
            let headers = response.headers_mut();
            headers.insert(
                http::header::CONTENT_TYPE,
                "text/event-stream".parse().unwrap(),
            );
            headers.insert(http::header::CACHE_CONTROL, "no-cache".parse().unwrap());
            headers.insert(http::header::CONNECTION, "keep-alive".parse().unwrap());
            response
        }
    })
}

/// Collect the inbound body, bounded by the configured cap. Transport
/// read errors degrade to an empty body; an oversized body is refused.
async fn collect_inbound<B>(body: B, cap: usize) -> Result<Bytes>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, cap).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() => {
            Err(GatewayError::Status {
                code: 413,
                reason: "Payload Too Large".to_string(),
            })
        }
        Err(_) => Ok(Bytes::new()),
    }
}

fn into_proxy_response(response: Response<Vec<u8>>) -> hyper::Response<ProxyBody> {
    let (parts, body) = response.into_parts();
    hyper::Response::from_parts(parts, full_body(body))
}
