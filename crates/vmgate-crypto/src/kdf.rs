//! HKDF-SHA256 session key derivation.
//!
//! The response-direction session key is derived once per session from the
//! session id: `HKDF-SHA256(ikm = id, salt = ∅, info = "challenge-id-key", L = 32)`.

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

pub const SESSION_KEY_INFO: &[u8] = b"challenge-id-key";
pub const SESSION_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("HKDF expand failed: requested length exceeds 255 * hash length")]
    ExpandTooLong,
}

/// Derive the 32-byte session key from the session id (its raw bytes, not
/// re-hex-decoded — the id is already a hex *string*, and that string's
/// bytes are the IKM).
pub fn derive_session_key(session_id: &str) -> Result<[u8; SESSION_KEY_LEN], KdfError> {
    let hk = Hkdf::<Sha256>::new(None, session_id.as_bytes());
    let mut okm = [0u8; SESSION_KEY_LEN];
    hk.expand(SESSION_KEY_INFO, &mut okm)
        .map_err(|_| KdfError::ExpandTooLong)?;
    Ok(okm)
}

/// Generic HKDF-SHA256 derive, exposed for the RFC 5869 test vector suite
/// and for any future derivation that doesn't fit the session-key shape.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>, KdfError> {
    let salt_opt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt_opt, ikm);
    let mut okm = vec![0u8; out_len];
    hk.expand(info, &mut okm).map_err(|_| KdfError::ExpandTooLong)?;
    Ok(okm)
}
