//! HMAC-SHA256 signing and constant-time verification, used for the
//! fingerprint envelope signature (§6) and available for any other
//! signed-blob need in the challenge protocol.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// `HMAC-SHA256(key, message)`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison of a freshly computed HMAC against one
/// received over the wire. Never short-circuits on the first mismatching
/// byte, preventing a timing side channel on the signature check.
pub fn verify_hmac_sha256(key: &[u8], message: &[u8], candidate: &[u8]) -> bool {
    let expected = hmac_sha256(key, message);
    if candidate.len() != expected.len() {
        return false;
    }
    expected.ct_eq(candidate).into()
}
