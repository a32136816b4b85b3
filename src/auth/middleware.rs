//! Authentication middleware for the MCP endpoint.
//!
//! Extracts the bearer token from the Authorization header, verifies it, and
//! stores the [`VerifiedToken`] in request extensions. Every rejection is the
//! same 401 response; the specific reason is only logged.

use crate::auth::claims::VerifiedToken;
use crate::auth::verifier::TokenVerifier;
use crate::error::UNAUTHORIZED;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Path of the OAuth protected resource metadata document (RFC 9728).
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
    /// Absolute URL of the protected resource metadata, advertised on 401
    pub resource_metadata_url: String,
}

/// Reject requests without a verifiable bearer token.
#[instrument(skip_all, name = "auth.require_bearer")]
pub async fn require_bearer(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
        tracing::debug!("Missing or malformed Authorization header");
        return unauthorized(&state, false);
    };

    match state.verifier.verify(&token).await {
        Ok(verified) => {
            tracing::debug!(client_id = %verified.client_id, "Request authenticated");
            req.extensions_mut().insert(verified);
            next.run(req).await
        }
        Err(e) => {
            tracing::info!(reason = e.kind(), "Request rejected");
            unauthorized(&state, true)
        }
    }
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn unauthorized(state: &AuthState, invalid_token: bool) -> Response {
    let challenge = if invalid_token {
        format!(
            r#"Bearer error="invalid_token", resource_metadata="{}""#,
            state.resource_metadata_url
        )
    } else {
        format!(r#"Bearer resource_metadata="{}""#, state.resource_metadata_url)
    };

    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": UNAUTHORIZED })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Extension trait for handlers that need the authenticated caller.
pub trait VerifiedTokenExt {
    fn verified_token(&self) -> Option<&VerifiedToken>;
}

impl<B> VerifiedTokenExt for axum::http::Request<B> {
    fn verified_token(&self) -> Option<&VerifiedToken> {
        self.extensions().get::<VerifiedToken>()
    }
}

impl VerifiedTokenExt for axum::http::request::Parts {
    fn verified_token(&self) -> Option<&VerifiedToken> {
        self.extensions.get::<VerifiedToken>()
    }
}

/// OAuth 2.0 protected resource metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    pub fn new(resource: impl Into<String>, issuer: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![issuer.into()],
            bearer_methods_supported: vec!["header".to_string()],
            scopes_supported: scopes,
        }
    }
}

pub async fn protected_resource_metadata(
    State(metadata): State<Arc<ProtectedResourceMetadata>>,
) -> Json<ProtectedResourceMetadata> {
    Json(metadata.as_ref().clone())
}
