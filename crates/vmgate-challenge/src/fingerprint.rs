//! Fingerprint envelope verification (§4.8, §6): the client signs its
//! collected fingerprint payload with the per-session signing key handed
//! out at `GET /challenge` time, and the server re-derives and
//! constant-time-compares the signature before trusting the payload.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use vmgate_crypto::verify_hmac_sha256;
use vmgate_kv::KvStore;

use crate::session::{signing_key_for_fp_token, SessionError};

/// A timestamp more than 5 minutes old is treated as stale and more than
/// 60s in the future as clock-skew abuse (§4.8).
const MAX_AGE: Duration = Duration::from_secs(5 * 60);
const MAX_SKEW_FUTURE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("fingerprint signing key not found for this token")]
    UnknownToken(#[from] SessionError),
    #[error("signature is not valid base64")]
    BadSignatureEncoding,
    #[error("signature does not match the payload")]
    SignatureMismatch,
    #[error("timestamp is outside the accepted window")]
    TimestampOutOfRange,
    #[error("payload is not valid JSON")]
    BadPayload(#[from] serde_json::Error),
    #[error("system clock is before the unix epoch")]
    ClockError,
}

/// The envelope shape posted alongside a fingerprint submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintEnvelope {
    pub payload: Value,
    pub timestamp: i64,
    pub signature: String,
    pub token: String,
}

/// Verify `envelope`'s signature and timestamp window, returning the
/// fingerprint payload on success.
pub async fn verify_fingerprint(
    kv: &dyn KvStore,
    envelope: &FingerprintEnvelope,
) -> Result<Value, FingerprintError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| FingerprintError::ClockError)?
        .as_secs() as i64;
    let age = now - envelope.timestamp;
    if age > MAX_AGE.as_secs() as i64 || age < -(MAX_SKEW_FUTURE.as_secs() as i64) {
        return Err(FingerprintError::TimestampOutOfRange);
    }

    let signing_key = signing_key_for_fp_token(kv, &envelope.token).await?;

    let payload_json = serde_json::to_string(&envelope.payload)?;
    let message = format!("{payload_json}|{}", envelope.timestamp);
    let signature = STANDARD
        .decode(&envelope.signature)
        .map_err(|_| FingerprintError::BadSignatureEncoding)?;

    if !verify_hmac_sha256(&signing_key, message.as_bytes(), &signature) {
        return Err(FingerprintError::SignatureMismatch);
    }

    Ok(envelope.payload.clone())
}
