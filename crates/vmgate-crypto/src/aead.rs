//! Packed ChaCha20-Poly1305: `IV‖CT‖TAG` as a single byte string, with an
//! empty AAD, as used for every encrypted body in the challenge protocol
//! (§6 "Session encryption envelope") and for the encrypted WASM blob
//! (§4.6 step 5).

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand_core::{OsRng, RngCore};
use thiserror::Error;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AeadError {
    #[error("packed ciphertext shorter than iv+tag ({0} bytes)")]
    Truncated(usize),
    #[error("key must be exactly {KEY_LEN} bytes, got {0}")]
    BadKeyLen(usize),
    #[error("AEAD authentication failed")]
    AuthFailed,
}

/// Encrypt `plaintext` under `key` (exactly 32 bytes) with a fresh random
/// 12-byte IV and empty AAD. Returns `iv ‖ ciphertext ‖ tag`.
pub fn pack_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, AeadError> {
    let cipher = cipher_from_key(key)?;
    let mut iv_bytes = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);
    let ct = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: b"" })
        .map_err(|_| AeadError::AuthFailed)?;
    let mut out = Vec::with_capacity(IV_LEN + ct.len());
    out.extend_from_slice(&iv_bytes);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypt a packed `iv ‖ ciphertext ‖ tag` buffer produced by [`pack_encrypt`].
pub fn pack_decrypt(key: &[u8], packed: &[u8]) -> Result<Vec<u8>, AeadError> {
    if packed.len() < IV_LEN + TAG_LEN {
        return Err(AeadError::Truncated(packed.len()));
    }
    let cipher = cipher_from_key(key)?;
    let (iv_bytes, ct_and_tag) = packed.split_at(IV_LEN);
    let nonce = Nonce::from_slice(iv_bytes);
    cipher
        .decrypt(nonce, Payload { msg: ct_and_tag, aad: b"" })
        .map_err(|_| AeadError::AuthFailed)
}

/// Decrypt a ciphertext given `key`/`iv`/`tag` as separate slices rather
/// than a single packed buffer, for callers (the VM's `chacha_decrypt`
/// action) that receive them that way already split out of a params blob.
pub fn decrypt_with_iv_tag(
    key: &[u8],
    iv: &[u8],
    tag: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AeadError> {
    if iv.len() != IV_LEN {
        return Err(AeadError::Truncated(iv.len()));
    }
    let cipher = cipher_from_key(key)?;
    let nonce = Nonce::from_slice(iv);
    let mut msg = Vec::with_capacity(ciphertext.len() + tag.len());
    msg.extend_from_slice(ciphertext);
    msg.extend_from_slice(tag);
    cipher
        .decrypt(nonce, Payload { msg: &msg, aad: b"" })
        .map_err(|_| AeadError::AuthFailed)
}

fn cipher_from_key(key: &[u8]) -> Result<ChaCha20Poly1305, AeadError> {
    if key.len() != KEY_LEN {
        return Err(AeadError::BadKeyLen(key.len()));
    }
    Ok(ChaCha20Poly1305::new(Key::from_slice(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    #[test]
    fn round_trips() {
        let key = test_key();
        let plaintext = b"challenge credential payload";
        let packed = pack_encrypt(&key, plaintext).unwrap();
        assert_eq!(packed.len(), IV_LEN + plaintext.len() + TAG_LEN);
        let recovered = pack_decrypt(&key, &packed).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = test_key();
        let mut packed = pack_encrypt(&key, b"hello").unwrap();
        let last = packed.len() - 1;
        packed[last] ^= 0x01;
        assert!(matches!(pack_decrypt(&key, &packed), Err(AeadError::AuthFailed)));
    }

    #[test]
    fn wrong_key_fails_auth() {
        let packed = pack_encrypt(&test_key(), b"hello").unwrap();
        assert!(matches!(
            pack_decrypt(&[0x99u8; 32], &packed),
            Err(AeadError::AuthFailed)
        ));
    }

    #[test]
    fn truncated_input_rejected() {
        let key = test_key();
        assert!(matches!(pack_decrypt(&key, &[0u8; 4]), Err(AeadError::Truncated(4))));
    }

    /// RFC 7539 §2.8.2 test vector (key/nonce/aad/plaintext -> ciphertext+tag).
    #[test]
    fn rfc7539_test_vector() {
        let key: [u8; 32] = hex_literal(
            "808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9fa0a1a2a3a4a5a6a7a8a9aaabacadaeaf",
        );
        let nonce_bytes: [u8; 12] = hex_literal12("070000004041424344454647");
        let aad = hex_decode("50515253c0c1c2c3c4c5c6c7");
        let plaintext = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ct = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: &aad })
            .unwrap();
        let expected_ct = hex_decode(
            "d31a8d34648e60db7b86afbc53ef7ec2a4aded51296e08fea9e2b5a736ee62d\
             63dbea45e8ca9671282fafb69da92728b1a71de0a9e060b2905d6a5b67ecd3b\
             3692ddbd7f2d778b8c9803aee328091b58fab324e4fad675945585808b4831\
             d7bc3ff4def08e4b7a9de576d26586cec64b6116",
        );
        let expected_tag = hex_decode("1ae10b594f09e26a7e902ecbd0600691");
        assert_eq!(ct[..ct.len() - 16], expected_ct[..]);
        assert_eq!(ct[ct.len() - 16..], expected_tag[..]);
    }

    fn hex_decode(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    fn hex_literal(s: &str) -> [u8; 32] {
        let v = hex_decode(s);
        v.try_into().unwrap()
    }

    fn hex_literal12(s: &str) -> [u8; 12] {
        let v = hex_decode(s);
        v.try_into().unwrap()
    }
}
