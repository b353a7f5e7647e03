//! Challenge tokens (§4.6 step 6, §4.8 step 2): a JWT binding a solver to
//! the `challengeId` it was issued for, signed with `CHALLENGE_VERIFY_SECRET`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token encode/decode failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("system clock is before the unix epoch")]
    ClockError,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    challenge_id: String,
    exp: usize,
}

/// Sign a JWT binding `challenge_id`, expiring `ttl` from now.
pub fn sign_challenge_token(secret: &[u8], challenge_id: &str, ttl: Duration) -> Result<String, TokenError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TokenError::ClockError)?;
    let claims = Claims {
        challenge_id: challenge_id.to_string(),
        exp: (now + ttl).as_secs() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

/// Verify a challenge JWT and return the `challengeId` it was issued for.
/// Expiry is checked by `jsonwebtoken` itself against the claim's `exp`.
pub fn verify_challenge_token(secret: &[u8], token: &str) -> Result<String, TokenError> {
    let mut validation = Validation::default();
    // No grace period: a challenge token past its exp is a used-up
    // challenge, not a clock-skew edge case.
    validation.leeway = 0;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(data.claims.challenge_id)
}
