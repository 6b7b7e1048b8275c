//! Event stream relay for server-sent events.
//!
//! Backends that answer with `text/event-stream` are relayed chunk by
//! chunk instead of buffered, so long-lived pushes reach the caller as
//! the backend emits them.

use std::convert::Infallible;

use futures_util::{future, StreamExt};
use http::HeaderMap;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;

use crate::proxy::ProxyBody;

/// Whether the backend declared an SSE body.
pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|content_type| content_type.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Turn the upstream response into a body that yields chunks as they
/// arrive. An upstream read error ends the stream cleanly, closing
/// the downstream connection without a synthesized error frame.
pub fn relay_body(upstream: reqwest::Response, request_id: String) -> ProxyBody {
    let chunks = upstream.bytes_stream().scan((), move |_, chunk| {
        future::ready(match chunk {
            Ok(data) => Some(Ok::<_, Infallible>(Frame::data(data))),
            Err(err) => {
                tracing::debug!(
                    request_id = %request_id,
                    error = %err,
                    "Event stream closed by upstream"
                );
                None
            }
        })
    });
    StreamBody::new(chunks).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_content_type(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_event_stream_detected() {
        assert!(is_event_stream(&headers_with_content_type(
            "text/event-stream"
        )));
        assert!(is_event_stream(&headers_with_content_type(
            "text/event-stream; charset=utf-8"
        )));
    }

    #[test]
    fn test_other_content_types_buffered() {
        assert!(!is_event_stream(&headers_with_content_type(
            "application/json"
        )));
        assert!(!is_event_stream(&headers_with_content_type("text/plain")));
        assert!(!is_event_stream(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn test_relay_passes_chunks_through() {
        let upstream = reqwest::Response::from(http::Response::new("data: ping\n\n"));
        let body = relay_body(upstream, "test-request".to_string());
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"data: ping\n\n");
    }
}
