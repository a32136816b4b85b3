//! Bearer token verification against the identity provider's key set.
//!
//! Verification order:
//! 1. Size and structure check, then parse the header without trusting it
//! 2. Reject any algorithm outside the RSA family
//! 3. Select candidate keys by `kid` (all keys when the header has none)
//! 4. On an unknown `kid`, force one key set refresh before giving up
//! 5. Try candidates in published order; the first that verifies signature,
//!    issuer and expiry wins
//! 6. Check audience when the deployment configures one

use crate::auth::claims::{Claims, VerifiedToken};
use crate::auth::keyset::{KeySetCache, SigningKey, ALLOWED_ALGORITHMS};
use crate::error::AuthError;
use async_trait::async_trait;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Header, Validation};
use std::sync::Arc;
use tracing::instrument;

/// Tokens larger than this are rejected before any parsing.
pub const MAX_TOKEN_BYTES: usize = 8192;

/// Result of verifying one bearer token.
pub type VerificationResult = Result<VerifiedToken, AuthError>;

/// Capability the HTTP layer depends on.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> VerificationResult;
}

/// Deployment policy for token verification.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Expected `iss`, e.g. `https://tenant.auth0.com/`
    pub issuer: String,
    /// Expected `aud`; `None` accepts any audience
    pub audience: Option<String>,
    /// Scopes assumed when the token carries no `scope` claim
    pub default_scopes: Vec<String>,
    /// Clock leeway applied to `exp`
    pub leeway_secs: u64,
}

impl VerifierConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: None,
            default_scopes: vec!["openid".to_string()],
            leeway_secs: 0,
        }
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }
}

/// Verifies RS-family JWTs using keys from a [`KeySetCache`].
pub struct JwtVerifier {
    keys: Arc<KeySetCache>,
    config: VerifierConfig,
}

impl JwtVerifier {
    pub fn new(keys: Arc<KeySetCache>, config: VerifierConfig) -> Self {
        Self { keys, config }
    }

    fn validation(&self, header: &Header) -> Validation {
        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = true;
        // Audience is a deployment policy, checked after decoding.
        validation.validate_aud = false;
        validation
    }

    async fn verify_inner(&self, token: &str) -> VerificationResult {
        let header = parse_header(token)?;
        let kid = header.kid.as_deref();

        let mut key_set = self.keys.get_key_set(false).await?;
        if kid.is_some() && key_set.candidates(kid).is_empty() {
            tracing::debug!(kid = ?kid, "No key matches kid, forcing key set refresh");
            key_set = self.keys.get_key_set(true).await?;
        }

        let candidates = key_set.candidates(kid);
        if candidates.is_empty() {
            return Err(AuthError::UnknownKey(kid.unwrap_or("<none>").to_string()));
        }

        let claims = self.verify_with_candidates(token, &header, &candidates)?;
        self.check_audience(&claims)?;

        Ok(VerifiedToken::from_claims(claims, &self.config.default_scopes))
    }

    fn verify_with_candidates(
        &self,
        token: &str,
        header: &Header,
        candidates: &[&SigningKey],
    ) -> Result<Claims, AuthError> {
        let validation = self.validation(header);
        let mut last_error = None;

        for key in candidates {
            if !key.accepts(header.alg) {
                last_error = Some(AuthError::BadSignature(format!(
                    "key {:?} is pinned to {:?}",
                    key.kid, key.algorithm
                )));
                continue;
            }

            match decode::<Claims>(token, key.decoding_key(), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => match classify(e) {
                    err @ AuthError::BadSignature(_) => last_error = Some(err),
                    // The signature verified, so this key's verdict stands.
                    err => return Err(err),
                },
            }
        }

        Err(last_error.unwrap_or_else(|| AuthError::BadSignature("no usable key".to_string())))
    }

    fn check_audience(&self, claims: &Claims) -> Result<(), AuthError> {
        let Some(expected) = self.config.audience.as_deref() else {
            return Ok(());
        };
        match &claims.aud {
            Some(aud) if aud.contains(expected) => Ok(()),
            _ => Err(AuthError::AudienceMismatch),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> VerificationResult {
        let result = self.verify_inner(token).await;
        match &result {
            Ok(verified) => {
                tracing::debug!(client_id = %verified.client_id, "Token verified");
            }
            Err(AuthError::Unavailable(reason)) => {
                tracing::warn!(reason = %reason, "Token rejected: key set unavailable");
            }
            Err(e) => {
                tracing::debug!(kind = e.kind(), error = %e, "Token rejected");
            }
        }
        result
    }
}

/// Structural checks plus header decode. Nothing here is trusted yet.
fn parse_header(token: &str) -> Result<Header, AuthError> {
    if token.len() > MAX_TOKEN_BYTES {
        return Err(AuthError::Malformed(format!(
            "token is {} bytes (max {})",
            token.len(),
            MAX_TOKEN_BYTES
        )));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments[0].is_empty() || segments[1].is_empty() {
        return Err(AuthError::Malformed(
            "expected three dot-separated segments".to_string(),
        ));
    }

    let header =
        decode_header(token).map_err(|e| AuthError::Malformed(format!("bad header: {}", e)))?;

    if !ALLOWED_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::Malformed(format!(
            "algorithm {:?} is not accepted",
            header.alg
        )));
    }

    Ok(header)
}

fn classify(err: JwtError) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidKeyFormat => AuthError::BadSignature(err.to_string()),
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        _ => AuthError::Malformed(err.to_string()),
    }
}
