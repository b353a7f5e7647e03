//! Ephemeral X25519 key exchange for the request-direction envelope (§6):
//! the client generates a fresh keypair per request, ships its public key
//! alongside the ciphertext, and the server combines it with the
//! session's static private key to get the shared secret.

use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

pub const PUBLIC_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("public key must be exactly {PUBLIC_KEY_LEN} bytes, got {0}")]
    BadPublicKeyLen(usize),
}

/// The server's per-session X25519 keypair. The private half is persisted
/// in the session record (KV key `session:{id}`, §6) for the lifetime of
/// the session; the public half is what `GET /challenge` hands to the client.
pub struct ServerKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl ServerKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand_core::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Diffie-Hellman the server's private key against a peer public key
    /// sent by the client as raw bytes.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32], X25519Error> {
        let peer_public: [u8; 32] = peer_public
            .try_into()
            .map_err(|_| X25519Error::BadPublicKeyLen(peer_public.len()))?;
        let peer = PublicKey::from(peer_public);
        Ok(self.secret.diffie_hellman(&peer).to_bytes())
    }
}

/// A single-use client-side keypair, used only by tests to simulate the
/// request-direction envelope end to end.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand_core::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn shared_secret(&self, server_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*server_public);
        self.secret.diffie_hellman(&peer).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_agrees_both_directions() {
        let server = ServerKeyPair::generate();
        let client = EphemeralKeyPair::generate();

        let server_side = server.shared_secret(&client.public_bytes()).unwrap();
        let client_side = client.shared_secret(&server.public_bytes());

        assert_eq!(server_side, client_side);
    }

    #[test]
    fn persisted_secret_round_trips() {
        let server = ServerKeyPair::generate();
        let bytes = server.secret_bytes();
        let restored = ServerKeyPair::from_secret_bytes(&bytes);
        assert_eq!(restored.public_bytes(), server.public_bytes());
    }

    #[test]
    fn rejects_malformed_public_key() {
        let server = ServerKeyPair::generate();
        assert!(server.shared_secret(&[0u8; 10]).is_err());
    }
}
