//! Token claims.
//!
//! [`Claims`] is only ever produced by `jsonwebtoken::decode` after the
//! signature has verified. [`VerifiedToken`] is what the rest of the server
//! sees; its `Debug` output redacts the subject.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// Payload of a verified access token.
#[derive(Clone, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: i64,
    /// Space-delimited scope string
    #[serde(default)]
    pub scope: Option<String>,
    /// Explicit client identifier, when the provider issues one
    #[serde(default)]
    pub client_id: Option<String>,
    /// Authorized party (Auth0 puts the client ID here)
    #[serde(default)]
    pub azp: Option<String>,
}

impl Claims {
    /// Client identifier: `client_id`, then `azp`, then `sub`.
    pub fn client_id(&self) -> &str {
        non_empty(&self.client_id)
            .or_else(|| non_empty(&self.azp))
            .unwrap_or(&self.sub)
    }

    /// Scope tokens split on whitespace; `default` when the claim is absent or blank.
    pub fn scopes(&self, default: &[String]) -> Vec<String> {
        match self.scope.as_deref().map(str::trim) {
            Some(scope) if !scope.is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => default.to_vec(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Outcome of a successful verification.
#[derive(Clone, Serialize)]
pub struct VerifiedToken {
    pub client_id: String,
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    /// Expiry, Unix epoch seconds
    pub expires_at: i64,
}

impl VerifiedToken {
    pub fn from_claims(claims: Claims, default_scopes: &[String]) -> Self {
        let scopes = claims.scopes(default_scopes);
        let client_id = claims.client_id().to_string();
        Self {
            client_id,
            subject: claims.sub,
            issuer: claims.iss,
            audience: claims.aud.map(Audience::into_vec).unwrap_or_default(),
            scopes,
            expires_at: claims.exp,
        }
    }
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let client_id = if self.client_id == self.subject {
            "[REDACTED]"
        } else {
            self.client_id.as_str()
        };
        f.debug_struct("VerifiedToken")
            .field("client_id", &client_id)
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
