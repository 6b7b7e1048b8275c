//! Forwarding engine: reissues inbound requests against resolved
//! backends over a shared connection pool.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{HeaderMap, Method, StatusCode};

use crate::config::ForwardConfig;
use crate::error::{GatewayError, Result};
use crate::proxy::streaming::is_event_stream;

/// Transport-owned headers, recomputed rather than relayed
const TRANSPORT_HEADERS: [http::HeaderName; 3] = [
    http::header::TRANSFER_ENCODING,
    http::header::CONTENT_LENGTH,
    http::header::CONTENT_ENCODING,
];

/// Outcome of a forwarded call
pub enum ForwardedResponse {
    /// Fully buffered backend response
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Open-ended event stream, relayed chunk by chunk
    Streaming {
        status: StatusCode,
        headers: HeaderMap,
        upstream: reqwest::Response,
    },
}

/// Issues outbound calls and classifies their results.
pub struct ForwardEngine {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ForwardEngine {
    pub fn new(config: &ForwardConfig) -> Self {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(100);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().unwrap_or_default();

        Self {
            client,
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Reissue the request against the resolved target URL.
    ///
    /// GET never forwards a body, POST and PUT always do, DELETE only
    /// when one was supplied. Anything else is refused before any
    /// backend is contacted.
    pub async fn forward(
        &self,
        method: &Method,
        target_url: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse> {
        let request = match *method {
            Method::GET => self.client.get(target_url),
            Method::POST => self.client.post(target_url).body(body),
            Method::PUT => self.client.put(target_url).body(body),
            Method::DELETE => {
                let request = self.client.delete(target_url);
                if body.is_empty() {
                    request
                } else {
                    request.body(body)
                }
            }
            _ => return Err(GatewayError::UnsupportedMethod(method.to_string())),
        };

        let response = request.headers(outbound_headers(headers)).send().await?;
        let status = response.status();
        let relayed = relay_headers(response.headers());

        if is_event_stream(response.headers()) {
            return Ok(ForwardedResponse::Streaming {
                status,
                headers: relayed,
                upstream: response,
            });
        }

        let body = self.read_capped(response).await?;
        Ok(ForwardedResponse::Buffered {
            status,
            headers: relayed,
            body,
        })
    }

    /// Buffer the upstream body, bounded by the configured cap.
    async fn read_capped(&self, response: reqwest::Response) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > self.max_body_bytes {
                return Err(GatewayError::UpstreamBodyTooLarge(self.max_body_bytes));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// Inbound headers minus `Host` and the transport-owned set. The
/// client recomputes framing for the body it actually sends, so a
/// stale `Content-Length` from a dropped body never goes out.
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(http::header::HOST);
    headers.remove(http::header::CONTENT_LENGTH);
    headers.remove(http::header::TRANSFER_ENCODING);
    headers
}

/// Backend response headers minus the transport-owned set.
fn relay_headers(backend: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in backend {
        if TRANSPORT_HEADERS.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ForwardEngine {
        ForwardEngine::new(&ForwardConfig::default())
    }

    #[tokio::test]
    async fn test_unsupported_methods_refused() {
        for method in [Method::PATCH, Method::OPTIONS, Method::HEAD, Method::TRACE] {
            let result = engine()
                .forward(&method, "http://127.0.0.1:1/x", &HeaderMap::new(), Bytes::new())
                .await;
            match result {
                Err(GatewayError::UnsupportedMethod(m)) => assert_eq!(m, method.as_str()),
                other => panic!("expected UnsupportedMethod, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let result = engine()
            .forward(
                &Method::GET,
                "http://127.0.0.1:1/api/x",
                &HeaderMap::new(),
                Bytes::new(),
            )
            .await;
        match result {
            Err(err @ GatewayError::Transport(_)) => assert_eq!(err.status_code(), 502),
            other => panic!("expected Transport error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_outbound_headers_drop_host_and_framing() {
        let mut inbound = HeaderMap::new();
        inbound.insert(http::header::HOST, "gateway.local".parse().unwrap());
        inbound.insert(http::header::CONTENT_LENGTH, "42".parse().unwrap());
        inbound.insert("x-custom", "kept".parse().unwrap());
        inbound.insert(http::header::AUTHORIZATION, "Bearer abc".parse().unwrap());

        let outbound = outbound_headers(&inbound);
        assert!(outbound.get(http::header::HOST).is_none());
        assert!(outbound.get(http::header::CONTENT_LENGTH).is_none());
        assert_eq!(outbound.get("x-custom").unwrap(), "kept");
        assert_eq!(outbound.get(http::header::AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn test_relay_headers_skip_transport_set() {
        let mut backend = HeaderMap::new();
        backend.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
        backend.insert(http::header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        backend.insert(http::header::CONTENT_LENGTH, "99".parse().unwrap());
        backend.insert(http::header::CONTENT_ENCODING, "gzip".parse().unwrap());
        backend.append(http::header::SET_COOKIE, "a=1".parse().unwrap());
        backend.append(http::header::SET_COOKIE, "b=2".parse().unwrap());

        let relayed = relay_headers(&backend);
        assert_eq!(relayed.get(http::header::CONTENT_TYPE).unwrap(), "application/json");
        assert!(relayed.get(http::header::TRANSFER_ENCODING).is_none());
        assert!(relayed.get(http::header::CONTENT_LENGTH).is_none());
        assert!(relayed.get(http::header::CONTENT_ENCODING).is_none());
        assert_eq!(
            relayed.get_all(http::header::SET_COOKIE).iter().count(),
            2
        );
    }
}
