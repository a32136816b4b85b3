//! Shared fixtures for auth tests: RSA keys, token signing, scripted key sources.

use super::keyset::{KeySet, KeySource};
use crate::error::AuthError;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ISSUER: &str = "https://tenant.example.com/";
pub const AUDIENCE: &str = "https://papers.example.com/api";

pub fn jwk_json(name: &str) -> String {
    match name {
        "a" => include_str!("../../tests/fixtures/keys/rsa_a.jwk.json").to_string(),
        "b" => include_str!("../../tests/fixtures/keys/rsa_b.jwk.json").to_string(),
        other => panic!("no fixture key {other}"),
    }
}

fn private_pem(name: &str) -> &'static [u8] {
    match name {
        "a" => include_bytes!("../../tests/fixtures/keys/rsa_a.pem"),
        "b" => include_bytes!("../../tests/fixtures/keys/rsa_b.pem"),
        other => panic!("no fixture key {other}"),
    }
}

/// Key set made of the named fixture keys, in order.
pub fn key_set(names: &[&str]) -> KeySet {
    let entries: Vec<String> = names.iter().map(|name| jwk_json(name)).collect();
    let body = format!(r#"{{"keys": [{}]}}"#, entries.join(","));
    KeySet::from_jwks_json(body.as_bytes(), "https://tenant.example.com/.well-known/jwks.json")
        .unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims a well-behaved provider would issue.
pub fn valid_claims() -> serde_json::Value {
    serde_json::json!({
        "iss": ISSUER,
        "sub": "auth0|user-42",
        "aud": AUDIENCE,
        "exp": now() + 3600,
        "iat": now(),
        "scope": "openid read:papers",
    })
}

/// Sign `claims` with fixture key `name`, setting `kid` in the header.
pub fn sign(name: &str, kid: Option<&str>, claims: &serde_json::Value) -> String {
    sign_with(name, Algorithm::RS256, kid, claims)
}

pub fn sign_with(
    name: &str,
    alg: Algorithm,
    kid: Option<&str>,
    claims: &serde_json::Value,
) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(private_pem(name)).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Key source that replays a script of results and counts fetches.
pub struct ScriptedKeySource {
    script: Mutex<VecDeque<Result<KeySet, AuthError>>>,
    fetches: AtomicUsize,
}

impl ScriptedKeySource {
    pub fn new(script: Vec<Result<KeySet, AuthError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for ScriptedKeySource {
    async fn fetch(&self) -> Result<KeySet, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Unavailable("script exhausted".into())))
    }

    fn location(&self) -> &str {
        "scripted"
    }
}
