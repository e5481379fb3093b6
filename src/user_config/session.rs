//! Session tokens and revocation (spec §4.4 "Sessions").
//!
//! Grounded on `auth::sessions`'s JWT claims shape (`jsonwebtoken::{encode,
//! decode}`, a `jti` carried in the claims for revocation) but stripped
//! down to what spec §4.4 actually asks for: a bearer token carrying
//! `(apiKeyIdHash, jti, expiry)` and a short-lived in-process revocation
//! map swept on an interval, not a full device-fingerprint/MFA/
//! session-store machinery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The caller's derived ownership hash (spec §3 `apiKeyIdHash`).
    pub api_key_id_hash: String,
    /// JWT ID, the revocation key.
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issue a bearer token for `api_key_id_hash`, valid for this
    /// issuer's configured TTL.
    pub fn issue(&self, api_key_id_hash: &str) -> Result<(String, DateTime<Utc>, String), ConfigError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::days(1));
        let jti = Uuid::new_v4().to_string();
        let claims = SessionClaims {
            api_key_id_hash: api_key_id_hash.to_string(),
            jti: jti.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ConfigError::Invalid(format!("failed to sign session token: {e}")))?;
        Ok((token, expires_at, jti))
    }

    /// Verify and decode a bearer token. Expiry is checked by
    /// `jsonwebtoken`'s own `exp` validation.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, ConfigError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| ConfigError::InvalidSession)?;
        Ok(data.claims)
    }
}

/// Short-lived in-process revocation map keyed by `jti`, swept on an
/// interval (spec §4.4 "Revocation is tracked in a short-lived
/// in-process map ... swept every 10 minutes").
#[derive(Default)]
pub struct RevocationList {
    revoked: DashMap<String, Instant>,
}

impl RevocationList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn revoke(&self, jti: &str) {
        self.revoked.insert(jti.to_string(), Instant::now());
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }

    /// Drop entries older than `max_age`; called by the periodic sweep
    /// task so the map doesn't grow unbounded across a long-lived
    /// process.
    pub fn sweep(&self, max_age: Duration) {
        let cutoff = Instant::now().checked_sub(max_age).unwrap_or_else(Instant::now);
        self.revoked.retain(|_, revoked_at| *revoked_at > cutoff);
    }

    /// Spawn the periodic sweep task (spec §4.4 "swept every 10
    /// minutes"). The task exits once the shutdown signal fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
        mut shutdown: crate::shutdown::ShutdownWatch,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sweep(max_age),
                    _ = shutdown.draining() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_matching_claims() {
        let issuer = SessionIssuer::new("test-secret", Duration::from_secs(3600));
        let (token, _, jti) = issuer.issue("hash-abc").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.api_key_id_hash, "hash-abc");
        assert_eq!(claims.jti, jti);
    }

    #[test]
    fn tampered_token_fails_verification() {
        let issuer = SessionIssuer::new("test-secret", Duration::from_secs(3600));
        let (mut token, _, _) = issuer.issue("hash-abc").unwrap();
        token.push('x');
        assert!(matches!(issuer.verify(&token), Err(ConfigError::InvalidSession)));
    }

    #[test]
    fn revocation_list_tracks_and_sweeps() {
        let list = RevocationList::default();
        list.revoke("jti-1");
        assert!(list.is_revoked("jti-1"));
        list.sweep(Duration::from_secs(0));
        assert!(!list.is_revoked("jti-1"));
    }
}
