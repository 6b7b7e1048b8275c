//! Uniform JSON envelope wrapping every caller-visible response.
//!
//! Success and failure share one shape:
//!
//! ```json
//! {"result": true, "errorCode": null, "errorMsg": "OK", "data": null}
//! ```

use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Response wrapper shared by local endpoints and the error normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub result: bool,
    pub error_code: Option<u16>,
    pub error_msg: Option<String>,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    /// Successful response carrying a payload.
    pub fn ok(data: T) -> Self {
        Self {
            result: true,
            error_code: None,
            error_msg: Some("Api access succeeded".to_string()),
            data: Some(data),
        }
    }

    /// Successful response with an explicit message and payload.
    pub fn ok_with(msg: &str, data: T) -> Self {
        Self {
            result: true,
            error_code: None,
            error_msg: Some(msg.to_string()),
            data: Some(data),
        }
    }

    /// Serialize to JSON, falling back to a hand-built literal so a
    /// response body is always emitted.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| error_json_literal(500, "server internal error"))
    }
}

impl Envelope<()> {
    /// Failed response with a status code and message, null data.
    pub fn error(code: u16, msg: &str) -> Self {
        Self {
            result: false,
            error_code: Some(code),
            error_msg: Some(msg.to_string()),
            data: None,
        }
    }

    /// Successful response with a message and null data.
    pub fn ok_empty(msg: &str) -> Self {
        Self {
            result: true,
            error_code: None,
            error_msg: Some(msg.to_string()),
            data: None,
        }
    }
}

/// Error envelope built without serde, for when serialization itself fails.
pub fn error_json_literal(code: u16, msg: &str) -> String {
    format!(
        "{{\"result\": false, \"errorCode\": {}, \"errorMsg\": \"{}\", \"data\": null}}",
        code, msg
    )
}

/// Build a JSON response from an already-serialized body.
pub fn json_response(status: StatusCode, body: String) -> Response<Vec<u8>> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.into_bytes())
        .unwrap()
}

/// Map a gateway failure to its enveloped HTTP response.
///
/// Unsupported methods additionally get `Connection: close` so the
/// offending connection is not kept alive.
pub fn normalize_error(err: &GatewayError) -> Response<Vec<u8>> {
    let code = err.status_code();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Envelope::error(code, &err.public_message()).to_json();

    let mut builder = Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json;charset=UTF-8");
    if matches!(err, GatewayError::UnsupportedMethod(_)) {
        builder = builder.header(http::header::CONNECTION, "close");
    }
    builder.body(body.into_bytes()).unwrap()
}
