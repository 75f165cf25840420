use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hex::encode as hex_encode;
use sha2::{Digest, Sha256};

use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Turns an attachment storage key into a time-limited access URL.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, storage_key: &str) -> Result<SignedUrl>;
}

/// Signs `{base}/{key}?expires={ts}&signature={hex}` with SHA-256 over the
/// secret, key and expiry.
///
/// Expiry is aligned to the next `ttl` boundary plus one `ttl`, so repeated
/// signing inside one window yields the same URL and every URL stays valid
/// for at least `ttl`.
#[derive(Clone)]
pub struct Sha256UrlSigner {
    base_url: String,
    secret: Vec<u8>,
    ttl: Duration,
}

impl Sha256UrlSigner {
    pub fn new(base_url: impl Into<String>, secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            secret: secret.as_ref().to_vec(),
            ttl: ttl.max(Duration::from_secs(1)),
        }
    }

    pub fn sign_at(&self, storage_key: &str, now: DateTime<Utc>) -> Result<SignedUrl> {
        let key = storage_key.trim().trim_start_matches('/');
        if key.is_empty() {
            return Err(OrchestratorError::Store(
                "attachment has no storage key".to_string(),
            ));
        }
        let ttl = self.ttl.as_secs() as i64;
        let window_end = (now.timestamp().div_euclid(ttl) + 1) * ttl;
        let expires = window_end + ttl;
        let expires_at = Utc.timestamp_opt(expires, 0).single().ok_or_else(|| {
            OrchestratorError::Configuration(format!("expiry {expires} out of range"))
        })?;
        Ok(SignedUrl {
            url: format!(
                "{}/{}?expires={}&signature={}",
                self.base_url.trim_end_matches('/'),
                key,
                expires,
                self.signature(key, expires)
            ),
            expires_at,
        })
    }

    pub fn verify(&self, storage_key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        let key = storage_key.trim().trim_start_matches('/');
        expires >= now.timestamp() && self.signature(key, expires) == signature
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hex_encode(hasher.finalize())
    }
}

impl UrlSigner for Sha256UrlSigner {
    fn sign(&self, storage_key: &str) -> Result<SignedUrl> {
        self.sign_at(storage_key, Utc::now())
    }
}
