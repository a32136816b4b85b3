//! Signing key set fetched from the identity provider's JWKS endpoint.
//!
//! The cache holds at most one [`KeySet`] behind an `Arc`. Readers clone the
//! `Arc` under a momentary read lock and then work on an immutable snapshot;
//! a refresh fetches with no lock held and swaps the new set in under a short
//! write lock, so a reader sees either the old set or the new one, never a mix.
//!
//! Fetches are serialized: callers that queue behind an in-flight refresh reuse
//! its result instead of fetching again. Readers never wait on a fetch.

use crate::error::AuthError;
use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Signature algorithms accepted from the identity provider.
pub const ALLOWED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Default timeout for a JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A public key published by the identity provider.
#[derive(Clone)]
pub struct SigningKey {
    /// Key ID, if the provider publishes one
    pub kid: Option<String>,
    /// Algorithm pinned by the JWK's `alg` member
    pub algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl SigningKey {
    /// Build a signing key from a parsed JWK.
    ///
    /// Only RSA signature keys are accepted; anything else is rejected with a
    /// reason suitable for logging.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
            return Err("not an RSA key".to_string());
        }
        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Err("key is published for encryption".to_string());
        }

        let algorithm = match jwk.common.key_algorithm {
            None => None,
            Some(KeyAlgorithm::RS256) => Some(Algorithm::RS256),
            Some(KeyAlgorithm::RS384) => Some(Algorithm::RS384),
            Some(KeyAlgorithm::RS512) => Some(Algorithm::RS512),
            Some(other) => return Err(format!("unsupported key algorithm {:?}", other)),
        };

        let key = DecodingKey::from_jwk(jwk).map_err(|e| format!("invalid key material: {}", e))?;

        Ok(Self {
            kid: jwk.common.key_id.clone(),
            algorithm,
            key,
        })
    }

    /// Whether this key may verify a signature made with `alg`.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        ALLOWED_ALGORITHMS.contains(&alg) && self.algorithm.map_or(true, |pinned| pinned == alg)
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Raw JWKS document. Keys are kept as values so one bad entry does not
/// reject the whole set.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// Immutable snapshot of the provider's published keys.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: Vec<SigningKey>,
    fetched_at: Instant,
    source_url: String,
}

impl KeySet {
    pub fn new(keys: Vec<SigningKey>, source_url: impl Into<String>) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
            source_url: source_url.into(),
        }
    }

    /// Parse a JWKS response body.
    ///
    /// A body that is not a JWKS document fails; individual keys that cannot be
    /// used are skipped with a warning. A document left with no usable key fails.
    pub fn from_jwks_json(body: &[u8], source_url: &str) -> Result<Self, AuthError> {
        let document: JwksDocument = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(url = %source_url, error = %e, "JWKS body is not a key set");
            AuthError::Unavailable(format!("malformed JWKS body: {}", e))
        })?;

        let mut keys = Vec::with_capacity(document.keys.len());
        for (index, value) in document.keys.into_iter().enumerate() {
            let parsed = serde_json::from_value::<Jwk>(value)
                .map_err(|e| e.to_string())
                .and_then(|jwk| SigningKey::from_jwk(&jwk));
            match parsed {
                Ok(key) => keys.push(key),
                Err(reason) => {
                    tracing::warn!(url = %source_url, index, reason = %reason, "Skipping JWKS entry");
                }
            }
        }

        if keys.is_empty() {
            tracing::warn!(url = %source_url, "JWKS has no usable signing keys");
            return Err(AuthError::Unavailable(
                "JWKS has no usable signing keys".to_string(),
            ));
        }

        Ok(Self::new(keys, source_url))
    }

    /// Keys that may have signed a token with the given `kid`.
    ///
    /// With no `kid`, every key is a candidate. Order follows the published set.
    pub fn candidates(&self, kid: Option<&str>) -> Vec<&SigningKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .filter(|key| key.kid.as_deref() == Some(kid))
                .collect(),
            None => self.keys.iter().collect(),
        }
    }

    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Where key sets come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch a fresh key set.
    async fn fetch(&self) -> Result<KeySet, AuthError>;

    /// Location of the key set, for logs.
    fn location(&self) -> &str;
}

/// Fetches the key set over HTTP from a JWKS endpoint.
pub struct HttpKeySource {
    url: String,
    http_client: reqwest::Client,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Every fetch is bounded by `timeout`.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build JWKS HTTP client");
                AuthError::Unavailable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<KeySet, AuthError> {
        let response = self.http_client.get(&self.url).send().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch JWKS");
            AuthError::Unavailable(format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "JWKS endpoint returned error");
            return Err(AuthError::Unavailable(format!("JWKS endpoint returned {}", status)));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read JWKS body");
            AuthError::Unavailable(format!("failed to read body: {}", e))
        })?;

        KeySet::from_jwks_json(&body, &self.url)
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// Holds the most recent good [`KeySet`] and refreshes it on demand.
pub struct KeySetCache {
    source: Arc<dyn KeySource>,
    current: RwLock<Option<Arc<KeySet>>>,
    /// Held for the duration of a fetch; never taken by plain reads
    refresh: tokio::sync::Mutex<()>,
    max_age: Option<Duration>,
    min_refresh_interval: Duration,
}

impl KeySetCache {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
            max_age: None,
            min_refresh_interval: Duration::ZERO,
        }
    }

    /// Refresh a cached set once it is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Ignore forced refreshes while the cached set is younger than `interval`.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Return the current key set, fetching when empty, stale, or forced.
    ///
    /// A failed or empty fetch never replaces a good set: the last good set is
    /// served instead. The error only surfaces when nothing has been cached yet.
    pub async fn get_key_set(&self, force_refresh: bool) -> Result<Arc<KeySet>, AuthError> {
        let cached = self.snapshot();

        if let Some(set) = &cached {
            if !force_refresh && !self.is_stale(set) {
                return Ok(Arc::clone(set));
            }
            if force_refresh && set.age() < self.min_refresh_interval {
                tracing::debug!(
                    age_secs = set.age().as_secs(),
                    "Key set refreshed recently, skipping forced refresh"
                );
                return Ok(Arc::clone(set));
            }
            if !force_refresh {
                tracing::debug!(age_secs = set.age().as_secs(), "Key set is stale, refreshing");
            }
        }

        let _guard = self.refresh.lock().await;

        // Someone else refreshed while we waited.
        if let Some(current) = self.snapshot() {
            let replaced = cached
                .as_ref()
                .map_or(true, |seen| !Arc::ptr_eq(seen, &current));
            if replaced {
                return Ok(current);
            }
        }

        let fetched = self.source.fetch().await.and_then(|set| {
            if set.is_empty() {
                Err(AuthError::Unavailable("key set has no usable keys".to_string()))
            } else {
                Ok(set)
            }
        });

        match fetched {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                *self.current.write() = Some(Arc::clone(&fresh));
                tracing::info!(
                    url = %self.source.location(),
                    key_count = fresh.len(),
                    forced = force_refresh,
                    "Key set refreshed"
                );
                Ok(fresh)
            }
            Err(e) => match self.snapshot() {
                Some(last_good) => {
                    tracing::warn!(error = %e, "Key set refresh failed, serving last good set");
                    Ok(last_good)
                }
                None => Err(e),
            },
        }
    }

    /// Current set without fetching.
    pub fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.current.read().clone()
    }

    fn is_stale(&self, set: &KeySet) -> bool {
        self.max_age.map_or(false, |max_age| set.age() >= max_age)
    }
}
