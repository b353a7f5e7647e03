//! The challenge protocol (§4.6-§4.8, §6): per-session X25519/HKDF key
//! exchange, challenge generation against the reference VM, one-shot
//! server-side verification, and the HMAC-signed fingerprint envelope.

pub mod builder;
pub mod envelope;
pub mod fingerprint;
pub mod session;
pub mod token;
pub mod verifier;

pub use builder::{
    build_challenge, build_challenge_with_ttl, BuildError, Challenge, ChallengeCredential, OperationDto,
    CHALLENGE_TTL,
};
pub use envelope::{pack_response, unpack_request, EnvelopeError};
pub use fingerprint::{verify_fingerprint, FingerprintEnvelope, FingerprintError};
pub use session::{signing_key_for_fp_token, Session, SessionError, SESSION_TTL};
pub use token::{sign_challenge_token, verify_challenge_token, TokenError};
pub use verifier::{verify_solution, VerifyError, VerifyOutcome};
