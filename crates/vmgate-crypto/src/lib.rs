//! Crypto primitives for the challenge protocol's transport layer:
//! packed ChaCha20-Poly1305 AEAD, HKDF-SHA256 session key derivation,
//! ephemeral X25519 key exchange, and constant-time HMAC verification.
//!
//! None of this is novel cryptography — it is thin, documented wiring
//! around `chacha20poly1305`, `x25519-dalek`, `hkdf`, and `hmac` so the
//! rest of the workspace never touches raw key material directly.

pub mod aead;
pub mod kdf;
pub mod mac;
pub mod x25519;

pub use aead::{decrypt_with_iv_tag, pack_decrypt, pack_encrypt, AeadError};
pub use kdf::{derive_session_key, KdfError};
pub use mac::{hmac_sha256, verify_hmac_sha256};
pub use x25519::{EphemeralKeyPair, ServerKeyPair};
