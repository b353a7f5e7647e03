//! Route-boundary error translation (§7 "Error handling design"). Every
//! library crate returns its own typed error; only this module maps those
//! into HTTP status codes and bodies. Each rejection is logged at `warn!`
//! with the route and error kind before the response is built.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    InvalidEnvelope,
    DecryptionFailed,
    InvalidEntropy,
    InvalidFingerprint,
    FingerprintSignatureMismatch,
    TokenInvalid,
    TokenExpired,
    RiskBlocked(Vec<String>),
    EntropyScoreExceeded(Vec<String>),
    RateLimited { retry_after_secs: u64 },
    ChallengeNotFoundOrUsed,
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reasons: Vec<String>,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidEnvelope => "invalid_envelope",
            ApiError::DecryptionFailed => "decryption_failed",
            ApiError::InvalidEntropy => "invalid_entropy",
            ApiError::InvalidFingerprint => "invalid_fingerprint",
            ApiError::FingerprintSignatureMismatch => "fingerprint_signature_mismatch",
            ApiError::TokenInvalid => "token_invalid",
            ApiError::TokenExpired => "token_expired",
            ApiError::RiskBlocked(_) => "risk_blocked",
            ApiError::EntropyScoreExceeded(_) => "entropy_score_exceeded",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::ChallengeNotFoundOrUsed => "not_found_or_used",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidEnvelope
            | ApiError::DecryptionFailed
            | ApiError::InvalidEntropy
            | ApiError::InvalidFingerprint
            | ApiError::ChallengeNotFoundOrUsed => StatusCode::BAD_REQUEST,
            ApiError::FingerprintSignatureMismatch | ApiError::TokenInvalid | ApiError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::RiskBlocked(_) | ApiError::EntropyScoreExceeded(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(kind = self.kind(), status = status.as_u16(), "request rejected");

        let reasons = match &self {
            ApiError::RiskBlocked(r) | ApiError::EntropyScoreExceeded(r) => r.clone(),
            _ => Vec::new(),
        };
        let body = Json(ErrorBody { error: self.kind().to_string(), reasons });
        let mut response = (status, body).into_response();

        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("retry-after"), value);
            }
        }
        response
    }
}

impl From<vmgate_challenge::EnvelopeError> for ApiError {
    fn from(_: vmgate_challenge::EnvelopeError) -> Self {
        ApiError::InvalidEnvelope
    }
}

impl From<vmgate_challenge::SessionError> for ApiError {
    fn from(err: vmgate_challenge::SessionError) -> Self {
        match err {
            vmgate_challenge::SessionError::NotFound => ApiError::InvalidEnvelope,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<vmgate_challenge::BuildError> for ApiError {
    fn from(err: vmgate_challenge::BuildError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<vmgate_kv::KvError> for ApiError {
    fn from(err: vmgate_kv::KvError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<vmgate_challenge::VerifyError> for ApiError {
    fn from(err: vmgate_challenge::VerifyError) -> Self {
        match err {
            vmgate_challenge::VerifyError::Token(_) => ApiError::TokenInvalid,
            vmgate_challenge::VerifyError::Kv(e) => ApiError::from(e),
            vmgate_challenge::VerifyError::CorruptExpected => {
                ApiError::Internal("stored expected value is corrupt".to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(_: serde_json::Error) -> Self {
        ApiError::InvalidEnvelope
    }
}
