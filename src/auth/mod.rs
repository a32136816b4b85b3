//! Bearer token authentication against a third-party identity provider.

pub mod claims;
pub mod keyset;
pub mod middleware;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testutil;

pub use claims::{Audience, Claims, VerifiedToken};
pub use keyset::{HttpKeySource, KeySet, KeySetCache, KeySource, SigningKey};
pub use middleware::{require_bearer, AuthState};
pub use verifier::{JwtVerifier, TokenVerifier, VerificationResult, VerifierConfig};

use crate::error::Error;
use url::Url;

/// Issuer and JWKS location derived from the provider's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProvider {
    /// Expected `iss` claim, always with a trailing slash
    pub issuer: String,
    /// `{issuer}.well-known/jwks.json`
    pub jwks_url: String,
}

impl IdentityProvider {
    /// Accepts a bare domain (`tenant.auth0.com`, HTTPS assumed) or a full
    /// base URL (`http://127.0.0.1:9000`).
    pub fn from_domain(domain: &str) -> Result<Self, Error> {
        let trimmed = domain.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Config("identity provider domain is empty".to_string()));
        }

        let base = if trimmed.contains("://") {
            format!("{}/", trimmed)
        } else {
            format!("https://{}/", trimmed)
        };

        let issuer = Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid identity provider domain: {}", e)))?;
        if issuer.host_str().is_none() {
            return Err(Error::Config(format!("{} has no host", domain)));
        }

        let jwks_url = issuer
            .join(".well-known/jwks.json")
            .map_err(|e| Error::Config(format!("invalid JWKS URL: {}", e)))?;

        Ok(Self {
            issuer: issuer.to_string(),
            jwks_url: jwks_url.to_string(),
        })
    }
}
