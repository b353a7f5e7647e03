//! Per-session state (§3 "Session", §6 `session:{id}` / `fp:sign:{token}`
//! keys): a static X25519 keypair for request-direction ECDH, a signing
//! key for the fingerprint envelope, and the session's lifetime in KV.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vmgate_crypto::ServerKeyPair;
use vmgate_kv::KvStore;

/// Session records live for 300s (§6), matching the challenge TTL: a
/// session that never completes a challenge exchange is worth no more.
pub const SESSION_TTL: Duration = Duration::from_secs(300);

const ID_BYTES: usize = 16;
const FP_TOKEN_BYTES: usize = 16;
const SIGNING_KEY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("kv error: {0}")]
    Kv(#[from] vmgate_kv::KvError),
    #[error("session not found or expired")]
    NotFound,
    #[error("stored session record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("stored private key has the wrong length")]
    BadKeyLen,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    secret_hex: String,
    signing_key_b64: String,
    fp_token: String,
}

/// A live session: its id, its static keypair, and its fingerprint
/// signing key. Constructed either fresh ([`Session::create`]) or by
/// reloading a persisted record ([`Session::load`]).
pub struct Session {
    pub id: String,
    pub keypair: ServerKeyPair,
    pub signing_key: [u8; SIGNING_KEY_BYTES],
    pub fp_token: String,
}

impl Session {
    /// Create a fresh session, persisting it under `session:{id}` and
    /// indexing its signing key under `fp:sign:{fp_token}` so the
    /// fingerprint endpoint can look it up without the session id.
    pub async fn create(kv: &dyn KvStore) -> Result<Session, SessionError> {
        Self::create_with_ttl(kv, SESSION_TTL).await
    }

    /// Same as [`Session::create`], with the session's KV lifetime taken
    /// from the deployment's `SESSION_TTL_SECS` instead of the default.
    pub async fn create_with_ttl(kv: &dyn KvStore, ttl: Duration) -> Result<Session, SessionError> {
        let id = random_hex(ID_BYTES);
        let fp_token = random_hex(FP_TOKEN_BYTES);
        let keypair = ServerKeyPair::generate();
        let mut signing_key = [0u8; SIGNING_KEY_BYTES];
        OsRng.fill_bytes(&mut signing_key);

        let record = SessionRecord {
            secret_hex: hex::encode(keypair.secret_bytes()),
            signing_key_b64: STANDARD.encode(signing_key),
            fp_token: fp_token.clone(),
        };
        let serialized = serde_json::to_string(&record)?;
        kv.set(&format!("session:{id}"), &serialized, ttl).await?;
        kv.set(&format!("fp:sign:{fp_token}"), &record.signing_key_b64, ttl)
            .await?;

        Ok(Session { id, keypair, signing_key, fp_token })
    }

    /// Reload a previously created session from KV.
    pub async fn load(kv: &dyn KvStore, id: &str) -> Result<Session, SessionError> {
        let raw = kv
            .get(&format!("session:{id}"))
            .await?
            .ok_or(SessionError::NotFound)?;
        let record: SessionRecord = serde_json::from_str(&raw)?;

        let secret_bytes: [u8; 32] = hex::decode(&record.secret_hex)
            .map_err(|_| SessionError::BadKeyLen)?
            .try_into()
            .map_err(|_| SessionError::BadKeyLen)?;
        let signing_key: [u8; SIGNING_KEY_BYTES] = STANDARD
            .decode(&record.signing_key_b64)
            .map_err(|_| SessionError::BadKeyLen)?
            .try_into()
            .map_err(|_| SessionError::BadKeyLen)?;

        Ok(Session {
            id: id.to_string(),
            keypair: ServerKeyPair::from_secret_bytes(&secret_bytes),
            signing_key,
            fp_token: record.fp_token,
        })
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.keypair.public_bytes()
    }
}

/// Fetch the signing key registered for a fingerprint token, independent
/// of knowing which session it belongs to.
pub async fn signing_key_for_fp_token(
    kv: &dyn KvStore,
    fp_token: &str,
) -> Result<[u8; SIGNING_KEY_BYTES], SessionError> {
    let b64 = kv
        .get(&format!("fp:sign:{fp_token}"))
        .await?
        .ok_or(SessionError::NotFound)?;
    STANDARD
        .decode(&b64)
        .map_err(|_| SessionError::BadKeyLen)?
        .try_into()
        .map_err(|_| SessionError::BadKeyLen)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmgate_kv::InMemoryKv;

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let kv = InMemoryKv::new();
        let created = Session::create(&kv).await.unwrap();
        let loaded = Session::load(&kv, &created.id).await.unwrap();
        assert_eq!(loaded.public_key_bytes(), created.public_key_bytes());
        assert_eq!(loaded.signing_key, created.signing_key);
        assert_eq!(loaded.fp_token, created.fp_token);
    }

    #[tokio::test]
    async fn fp_token_resolves_signing_key() {
        let kv = InMemoryKv::new();
        let created = Session::create(&kv).await.unwrap();
        let key = signing_key_for_fp_token(&kv, &created.fp_token).await.unwrap();
        assert_eq!(key, created.signing_key);
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let kv = InMemoryKv::new();
        assert!(matches!(
            Session::load(&kv, "deadbeef").await,
            Err(SessionError::NotFound)
        ));
    }
}
