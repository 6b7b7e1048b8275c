//! Endpoints served by the gateway itself: health probe, token
//! issuance and token validation. Anything these do not claim falls
//! through to the routing table.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialStore, TokenService};
use crate::envelope::{json_response, Envelope};

pub const HEALTHCHECK_PATH: &str = "/api/v1/healthcheck";
pub const TOKEN_PATH: &str = "/auth/token";
pub const VALIDATE_PATH: &str = "/auth/validate";

const MAX_APP_ID_CHARS: usize = 32;
const MAX_APP_SECRET_CHARS: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    app_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenGrant {
    token: String,
    token_type: &'static str,
    expires_in: u64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    app_id: String,
    app_name: String,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenStatus {
    valid: bool,
    app_id: String,
    app_name: String,
    remaining_time: u64,
    near_expiry: bool,
    validated_at: DateTime<Utc>,
}

/// Handlers for the paths the gateway answers without a backend.
pub struct LocalEndpoints {
    tokens: Arc<TokenService>,
    credentials: Arc<dyn CredentialStore>,
}

impl LocalEndpoints {
    pub fn new(tokens: Arc<TokenService>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            tokens,
            credentials,
        }
    }

    /// Answer the request if it targets a local endpoint, `None` when
    /// it belongs to the proxy path. A known path hit with the wrong
    /// method is still claimed, with a 405 envelope.
    pub async fn try_handle(
        &self,
        parts: &http::request::Parts,
        body: &Bytes,
    ) -> Option<Response<Vec<u8>>> {
        let path = parts.uri.path();
        match (path, &parts.method) {
            (HEALTHCHECK_PATH, &Method::GET) => Some(healthcheck()),
            (TOKEN_PATH, &Method::POST) => Some(self.issue_token(body).await),
            (VALIDATE_PATH, &Method::POST) => Some(self.validate_token(parts, body)),
            (HEALTHCHECK_PATH | TOKEN_PATH | VALIDATE_PATH, _) => {
                Some(method_not_allowed(&parts.method))
            }
            _ => None,
        }
    }

    async fn issue_token(&self, body: &Bytes) -> Response<Vec<u8>> {
        let request: TokenRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "Token request body rejected");
                return bad_request("Invalid request body");
            }
        };
        if let Some(message) = validate_token_request(&request) {
            tracing::warn!(app_id = %request.app_id, reason = message, "Token request rejected");
            return bad_request(message);
        }

        tracing::info!(app_id = %request.app_id, "Token request received");

        let identity = match self
            .credentials
            .validate(&request.app_id, &request.app_secret)
            .await
        {
            Some(identity) => identity,
            None => {
                return json_response(
                    StatusCode::UNAUTHORIZED,
                    Envelope::error(
                        401,
                        "App credential validation failed, please check appId and appSecret",
                    )
                    .to_json(),
                );
            }
        };

        let issued = match self.tokens.issue(&identity.app_id, &identity.app_name) {
            Ok(issued) => issued,
            Err(err) => {
                tracing::error!(app_id = %identity.app_id, error = %err, "Token generation failed");
                return json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Envelope::error(500, "Token generation failed").to_json(),
                );
            }
        };

        tracing::info!(
            app_id = %identity.app_id,
            app_name = %identity.app_name,
            expires_in_days = issued.expires_in / 86400,
            "Token generated"
        );

        let grant = TokenGrant {
            token: issued.token,
            token_type: "Bearer",
            expires_in: issued.expires_in,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
            app_id: identity.app_id,
            app_name: identity.app_name,
        };
        json_response(
            StatusCode::OK,
            Envelope::ok_with("Token generated successfully", grant).to_json(),
        )
    }

    fn validate_token(&self, parts: &http::request::Parts, body: &Bytes) -> Response<Vec<u8>> {
        tracing::info!("Token validation request received");

        let token = match extract_token(parts, body) {
            Some(token) => token,
            None => return bad_request("token is required"),
        };

        if !self.tokens.validate(&token) {
            return json_response(
                StatusCode::UNAUTHORIZED,
                Envelope::error(401, "Token invalid or expired").to_json(),
            );
        }

        let identity = match self.tokens.identity(&token) {
            Some(identity) => identity,
            None => {
                return json_response(
                    StatusCode::UNAUTHORIZED,
                    Envelope::error(401, "Token invalid or expired").to_json(),
                );
            }
        };
        let remaining = self.tokens.remaining_seconds(&token);

        tracing::info!(
            app_id = %identity.app_id,
            remaining_secs = remaining,
            "Token validated"
        );

        let status = TokenStatus {
            valid: true,
            app_id: identity.app_id,
            app_name: identity.app_name,
            remaining_time: remaining,
            near_expiry: self.tokens.near_expiry(&token),
            validated_at: Utc::now(),
        };
        json_response(
            StatusCode::OK,
            Envelope::ok_with("Token validated successfully", status).to_json(),
        )
    }
}

fn healthcheck() -> Response<Vec<u8>> {
    json_response(StatusCode::OK, Envelope::ok_empty("OK").to_json())
}

fn method_not_allowed(method: &Method) -> Response<Vec<u8>> {
    tracing::warn!(method = %method, "Method not allowed on local endpoint");
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        Envelope::error(405, "Method Not Allowed").to_json(),
    )
}

fn bad_request(message: &str) -> Response<Vec<u8>> {
    json_response(StatusCode::BAD_REQUEST, Envelope::error(400, message).to_json())
}

/// Field checks mirroring the credential request contract. Returns
/// the first violation.
fn validate_token_request(request: &TokenRequest) -> Option<&'static str> {
    if request.app_id.trim().is_empty() {
        return Some("appId must not be blank");
    }
    if request.app_id.chars().count() > MAX_APP_ID_CHARS {
        return Some("appId must not exceed 32 characters");
    }
    if request.app_secret.trim().is_empty() {
        return Some("appSecret must not be blank");
    }
    if request.app_secret.chars().count() > MAX_APP_SECRET_CHARS {
        return Some("appSecret must not exceed 64 characters");
    }
    None
}

/// Token from the `token` query parameter, else the JSON body.
fn extract_token(parts: &http::request::Parts, body: &Bytes) -> Option<String> {
    if let Some(query) = parts.uri.query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    serde_json::from_slice::<ValidateRequest>(body)
        .ok()
        .map(|request| request.token)
        .filter(|token| !token.trim().is_empty())
}
