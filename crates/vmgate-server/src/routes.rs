//! HTTP route handlers (§6 "HTTP surface"). Each handler only wires
//! together `vmgate-challenge`/`vmgate-risk`/`vmgate-kv`; no challenge or
//! VM logic lives in this crate.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use vmgate_challenge::{
    build_challenge_with_ttl, pack_response, unpack_request, verify_fingerprint, verify_solution,
    FingerprintEnvelope, Session, VerifyOutcome,
};
use vmgate_crypto::derive_session_key;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the axum router: the challenge protocol's three endpoints, the
/// manager/operator read endpoints, and a health check, all behind a
/// permissive CORS layer (the challenge is meant to be embeddable from any
/// origin that holds a valid session).
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/challenge", get(get_challenge).post(post_challenge))
        .route("/challenge/verify", post(post_verify))
        .route("/manager/requests", get(manager_requests))
        .route("/manager/fingerprints", get(manager_fingerprints))
        .layer(cors)
        .with_state(state)
}

fn client_ip(peer: SocketAddr, headers: &HeaderMap) -> String {
    // A deployment behind a reverse proxy sets X-Forwarded-For; trust the
    // first hop only, falling back to the socket's peer address.
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}

// ── GET /healthz ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub kv_reachable: bool,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let kv_reachable = state.kv.get("healthz:probe").await.is_ok();
    Json(HealthResponse {
        status: if kv_reachable { "ok" } else { "degraded" },
        kv_reachable,
    })
}

// ── GET /challenge ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct GetChallengeResponse {
    pub id: String,
    #[serde(rename = "encryptedPublicKey")]
    pub encrypted_public_key: String,
}

pub async fn get_challenge(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<GetChallengeResponse>, ApiError> {
    let ip = client_ip(peer, &headers);
    let session = Session::create_with_ttl(state.kv.as_ref(), Duration::from_secs(state.config.session_ttl_secs))
        .await?;
    let session_key = derive_session_key(&session.id).map_err(|e| ApiError::Internal(e.to_string()))?;
    let encrypted_public_key = pack_response(&session_key, &session.public_key_bytes())?;

    tracing::info!(session_id = %session.id, "session created");
    record_request(&state, "GET /challenge", &ip, "issued").await;
    Ok(Json(GetChallengeResponse { id: session.id, encrypted_public_key }))
}

// ── POST /challenge ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EnvelopeRequest {
    pub id: String,
    pub body: String,
}

#[derive(Serialize)]
pub struct EnvelopeResponse {
    pub id: String,
    pub credential: String,
}

/// The decrypted POST /challenge body: the client's collected entropy
/// samples and its signed fingerprint envelope (§2 "validate &
/// cross-reference entropy + fingerprint").
#[derive(Deserialize)]
struct ChallengeRequestBody {
    entropy: Vec<f64>,
    fingerprint: FingerprintEnvelope,
}

/// Entropy must be a non-empty sample of finite values in `[0, 1]` with
/// some spread; an all-identical or out-of-range sample indicates a
/// non-randomized or forged client collector.
fn validate_entropy(samples: &[f64]) -> bool {
    if samples.is_empty() {
        return false;
    }
    if !samples.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)) {
        return false;
    }
    let first = samples[0];
    samples.iter().any(|&v| (v - first).abs() > f64::EPSILON)
}

pub async fn post_challenge(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<EnvelopeRequest>,
) -> Result<Json<EnvelopeResponse>, ApiError> {
    let ip = client_ip(peer, &headers);
    crate::risk_gate::enforce(&state, &ip, &headers).await?;

    let session = Session::load(state.kv.as_ref(), &req.id).await?;
    let plaintext = unpack_request(&session.keypair, &req.body).map_err(|_| ApiError::DecryptionFailed)?;
    let body: ChallengeRequestBody = serde_json::from_slice(&plaintext)?;

    if !validate_entropy(&body.entropy) {
        return Err(ApiError::InvalidEntropy);
    }

    let fingerprint_payload = verify_fingerprint(state.kv.as_ref(), &body.fingerprint)
        .await
        .map_err(|_| ApiError::FingerprintSignatureMismatch)?;
    tracing::debug!(?fingerprint_payload, "fingerprint verified");

    let credential = build_challenge_with_ttl(
        &state.manifest,
        &state.wasm_bytes,
        state.config.challenge_verify_secret.as_bytes(),
        state.kv.as_ref(),
        Duration::from_secs(state.config.challenge_ttl_secs),
    )
    .await?;

    let response_payload = serde_json::json!({
        "encryptedWasm": credential.challenge.encrypted_wasm,
        "key": credential.challenge.wasm_key,
        "operations": credential.challenge.operations,
        "input": credential.challenge.input,
        "token": credential.challenge.token,
        "signingKey": STANDARD.encode(session.signing_key),
    });
    let session_key = derive_session_key(&session.id).map_err(|e| ApiError::Internal(e.to_string()))?;
    let plaintext = serde_json::to_vec(&response_payload)?;
    let credential_envelope = pack_response(&session_key, &plaintext)?;

    tracing::info!(challenge_id = %credential.challenge.challenge_id, "challenge issued");
    record_request(&state, "POST /challenge", &ip, "issued").await;
    Ok(Json(EnvelopeResponse { id: req.id, credential: credential_envelope }))
}

// ── POST /challenge/verify ──────────────────────────────────────

#[derive(Deserialize)]
struct VerifyRequestBody {
    token: String,
    solved: i64,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn post_verify(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<EnvelopeRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let ip = client_ip(peer, &headers);
    crate::risk_gate::enforce(&state, &ip, &headers).await?;

    let session = Session::load(state.kv.as_ref(), &req.id).await?;
    let plaintext = unpack_request(&session.keypair, &req.body).map_err(|_| ApiError::DecryptionFailed)?;
    let body: VerifyRequestBody = serde_json::from_slice(&plaintext)?;

    // §8 "solved outside [-2^31, 2^32-1] is rejected at parse time; values
    // in [-2^31, -1] are reinterpreted as u32 by zero-extension (bitcast)."
    if body.solved < -(1i64 << 31) || body.solved > u32::MAX as i64 {
        return Err(ApiError::InvalidEnvelope);
    }
    let solved = body.solved as u32;

    match verify_solution(state.config.challenge_verify_secret.as_bytes(), &body.token, solved, state.kv.as_ref())
        .await
    {
        Ok(VerifyOutcome::Correct) => {
            tracing::info!("challenge verified correctly");
            record_request(&state, "POST /challenge/verify", &ip, "correct").await;
            Ok(Json(VerifyResponse { ok: true, error: None }))
        }
        Ok(VerifyOutcome::Incorrect) => {
            record_request(&state, "POST /challenge/verify", &ip, "incorrect").await;
            Ok(Json(VerifyResponse { ok: false, error: None }))
        }
        Ok(VerifyOutcome::NotFoundOrUsed) => Err(ApiError::ChallengeNotFoundOrUsed),
        Err(e) => Err(ApiError::from(e)),
    }
}

// ── GET /manager/requests, GET /manager/fingerprints ────────────

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct RequestsResponse {
    pub requests: Vec<Value>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

const MANAGER_REQUESTS_KEY: &str = "manager:requests";
const MANAGER_REQUESTS_CAP: usize = 500;

pub async fn manager_requests(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<RequestsResponse>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let total = state.kv.l_len(MANAGER_REQUESTS_KEY).await?;

    let start = ((page - 1) * limit) as isize;
    let stop = start + limit as isize - 1;
    let raw = state.kv.l_range(MANAGER_REQUESTS_KEY, start, stop).await?;
    let requests = raw.into_iter().filter_map(|s| serde_json::from_str(&s).ok()).collect();

    Ok(Json(RequestsResponse { requests, total, page, limit }))
}

#[derive(Serialize)]
pub struct FingerprintsResponse {
    pub fingerprints: Vec<Value>,
}

pub async fn manager_fingerprints(State(state): State<AppState>) -> Result<Json<FingerprintsResponse>, ApiError> {
    let keys = state.kv.scan("fp:dev:").await?;
    let mut fingerprints = Vec::with_capacity(keys.len());
    for key in keys {
        if let Ok(Some(raw)) = state.kv.get(&key).await {
            if let Ok(value) = serde_json::from_str(&raw) {
                fingerprints.push(value);
            }
        }
    }
    Ok(Json(FingerprintsResponse { fingerprints }))
}

/// Append a compact record to the capped `manager:requests` feed (§4 of
/// the workspace expansion). Called from middleware-level logging, not on
/// the happy-path return value, so a slow push never affects latency.
pub async fn record_request(state: &AppState, route: &str, ip: &str, outcome: &str) {
    let record = serde_json::json!({
        "route": route,
        "ip": ip,
        "outcome": outcome,
        "at": chrono::Utc::now().to_rfc3339(),
    });
    if let Ok(serialized) = serde_json::to_string(&record) {
        let _ = state.kv.l_push(MANAGER_REQUESTS_KEY, &serialized).await;
        let _ = state.kv.l_trim(MANAGER_REQUESTS_KEY, MANAGER_REQUESTS_CAP).await;
    }
}
