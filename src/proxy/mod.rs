//! Outbound forwarding: buffered and streaming relay to backends.

pub mod forward;
pub mod streaming;

pub use forward::{ForwardEngine, ForwardedResponse};

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

/// Unified response body for the entrypoint, so buffered envelopes and
/// relayed streams share one response type.
pub type ProxyBody = UnsyncBoxBody<Bytes, std::convert::Infallible>;

/// Box a fully buffered body.
pub fn full_body(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into()).boxed_unsync()
}
