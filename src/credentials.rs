//! Bearer-token cache shared across runs.
//!
//! Interactive acquisition happens elsewhere (`rigbot login`); the pipeline
//! only ever reads an unexpired cached token, refreshing its view of the
//! cache at most once per run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CredentialError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

pub struct CredentialProvider {
    cache_path: PathBuf,
}

impl CredentialProvider {
    pub fn new(cache_path: PathBuf) -> Self {
        Self { cache_path }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Returns the cached token if it is still valid at `now`.
    pub fn token(&self, now: DateTime<Utc>) -> Result<String, CredentialError> {
        if !self.cache_path.exists() {
            return Err(CredentialError::Missing(self.cache_path.clone()));
        }
        let raw = fs::read_to_string(&self.cache_path)?;
        let cached: CachedToken = serde_json::from_str(&raw)?;
        if cached.expiry <= now {
            return Err(CredentialError::Expired(cached.expiry));
        }
        debug!(expiry = %cached.expiry, "using cached credentials");
        Ok(cached.token)
    }

    pub fn store(&self, token: &str, expiry: DateTime<Utc>) -> Result<(), CredentialError> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let cached = CachedToken {
            token: token.to_string(),
            expiry,
        };
        fs::write(&self.cache_path, serde_json::to_vec_pretty(&cached)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn provider() -> (tempfile::TempDir, CredentialProvider) {
        let dir = tempfile::tempdir().unwrap();
        let provider = CredentialProvider::new(dir.path().join("credentials.json"));
        (dir, provider)
    }

    #[test]
    fn missing_cache_asks_for_login() {
        let (_dir, provider) = provider();
        let err = provider.token(Utc::now()).unwrap_err();
        assert!(matches!(err, CredentialError::Missing(_)));
    }

    #[test]
    fn stored_token_round_trips_while_unexpired() {
        let (_dir, provider) = provider();
        let now = Utc::now();
        provider.store("abc123", now + Duration::hours(2)).unwrap();
        assert_eq!(provider.token(now).unwrap(), "abc123");
    }

    #[test]
    fn expired_token_is_rejected() {
        let (_dir, provider) = provider();
        let now = Utc::now();
        provider.store("abc123", now - Duration::minutes(1)).unwrap();
        let err = provider.token(now).unwrap_err();
        assert!(matches!(err, CredentialError::Expired(_)));
    }
}
