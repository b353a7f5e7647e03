//! Solution verification (§4.8): one-shot, constant-time comparison of a
//! claimed answer against the expected value stashed at challenge-build
//! time. `challenge:{id}` is consumed atomically so a token can only ever
//! be redeemed once, replayed or not.

use subtle::ConstantTimeEq;
use thiserror::Error;
use vmgate_kv::KvStore;

use crate::token::{verify_challenge_token, TokenError};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token invalid: {0}")]
    Token(#[from] TokenError),
    #[error("kv error: {0}")]
    Kv(#[from] vmgate_kv::KvError),
    #[error("stored expected value is corrupt")]
    CorruptExpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Correct,
    Incorrect,
    /// The challenge id the token names was never issued, already
    /// consumed, or expired out of KV.
    NotFoundOrUsed,
}

/// Verify `solved` against the challenge named by `token`. Consumes the
/// challenge record on the first call regardless of outcome — a second
/// attempt with the same token always reports [`VerifyOutcome::NotFoundOrUsed`].
pub async fn verify_solution(
    token_secret: &[u8],
    token: &str,
    solved: u32,
    kv: &dyn KvStore,
) -> Result<VerifyOutcome, VerifyError> {
    let challenge_id = verify_challenge_token(token_secret, token)?;

    let stored = kv.get_and_delete(&format!("challenge:{challenge_id}")).await?;
    let expected_raw = match stored {
        Some(v) => v,
        None => return Ok(VerifyOutcome::NotFoundOrUsed),
    };
    let expected: u32 = expected_raw.parse().map_err(|_| VerifyError::CorruptExpected)?;

    let matches: bool = expected.to_le_bytes().ct_eq(&solved.to_le_bytes()).into();
    Ok(if matches { VerifyOutcome::Correct } else { VerifyOutcome::Incorrect })
}
