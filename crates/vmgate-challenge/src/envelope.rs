//! Session encryption envelopes (§6 "Session encryption envelope"):
//!
//! - Request direction (client → server): the client generates a fresh
//!   X25519 keypair per request, and the wire body is
//!   `base64(iv ‖ ephemeral_pubkey ‖ ciphertext ‖ tag)`. The server
//!   combines the ephemeral public key with the session's static private
//!   key to recover the shared secret and decrypt in place — a fresh
//!   shared secret every request, so compromising one doesn't expose the
//!   others.
//! - Response direction (server → client): a single session key derived
//!   once via HKDF from the session id, reused for the life of the
//!   session. The wire body is `base64(iv ‖ ciphertext ‖ tag)`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use vmgate_crypto::aead::IV_LEN;
use vmgate_crypto::x25519::PUBLIC_KEY_LEN;
use vmgate_crypto::{pack_decrypt, pack_encrypt, AeadError, ServerKeyPair};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope body is not valid base64")]
    BadBase64,
    #[error("envelope body too short to contain an ephemeral public key")]
    Truncated,
    #[error("ECDH failed: {0}")]
    Ecdh(#[from] vmgate_crypto::x25519::X25519Error),
    #[error("AEAD failure: {0}")]
    Aead(#[from] AeadError),
}

/// Encrypt `plaintext` under the session's response key and base64-encode
/// the packed envelope for the wire.
pub fn pack_response(session_key: &[u8; 32], plaintext: &[u8]) -> Result<String, EnvelopeError> {
    let packed = pack_encrypt(session_key, plaintext)?;
    Ok(STANDARD.encode(packed))
}

/// Decrypt a base64 request-direction envelope: `iv ‖ ephemeral_pubkey ‖
/// ciphertext ‖ tag`. Re-derives the shared secret via ECDH against the
/// embedded ephemeral public key and the session's static keypair, then
/// hands `iv ‖ ciphertext ‖ tag` to the packed AEAD decryptor.
pub fn unpack_request(keypair: &ServerKeyPair, body_b64: &str) -> Result<Vec<u8>, EnvelopeError> {
    let raw = STANDARD
        .decode(body_b64.trim())
        .map_err(|_| EnvelopeError::BadBase64)?;
    if raw.len() <= IV_LEN + PUBLIC_KEY_LEN {
        return Err(EnvelopeError::Truncated);
    }
    let (iv, rest) = raw.split_at(IV_LEN);
    let (ephemeral_pubkey, ct_and_tag) = rest.split_at(PUBLIC_KEY_LEN);
    let shared_secret = keypair.shared_secret(ephemeral_pubkey)?;

    let mut packed = Vec::with_capacity(IV_LEN + ct_and_tag.len());
    packed.extend_from_slice(iv);
    packed.extend_from_slice(ct_and_tag);
    Ok(pack_decrypt(&shared_secret, &packed)?)
}
