//! Wiring between the axum request and the `vmgate-risk` rate
//! limiter/scorer (§4.7): both stages run before any protected route does
//! its own work.

use axum::http::HeaderMap;
use std::time::{SystemTime, UNIX_EPOCH};
use vmgate_risk::{RateLimitDecision, RateLimiter, RequestSignals};

use crate::error::ApiError;
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Run the rate limiter, then the header/ASN scorer, against `ip` and
/// `headers`. Returns `Ok(())` to proceed, or the `ApiError` the route
/// should respond with.
pub async fn enforce(state: &AppState, ip: &str, headers: &HeaderMap) -> Result<(), ApiError> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let now_secs = (now_ms / 1000) as i64;

    let limiter = RateLimiter::new(state.kv.as_ref());
    match limiter.check(ip, now_secs, now_ms as i64).await {
        RateLimitDecision::Blocked { retry_after } => {
            return Err(ApiError::RateLimited { retry_after_secs: retry_after.as_secs() });
        }
        RateLimitDecision::Allowed => {}
    }

    let asn = asn_for_request(state, ip).await;
    let signals = RequestSignals {
        ip,
        user_agent: header(headers, "user-agent"),
        origin: header(headers, "origin"),
        referer: header(headers, "referer"),
        sec_ch_ua: header(headers, "sec-ch-ua"),
        via: header(headers, "via"),
        asn: asn.as_deref(),
    };

    let result = vmgate_risk::score_request(&signals, &state.asn_table, state.kv.as_ref()).await;
    if state.config.risk_debug {
        tracing::debug!(ip, score = result.score, reasons = ?result.reasons, "risk score computed");
    }
    if result.blocked {
        if let Some(asn) = &asn {
            let _ = state.kv.s_add(&format!("risk:asn:{asn}"), ip).await;
        }
        return Err(ApiError::RiskBlocked(result.reasons));
    }
    Ok(())
}

async fn asn_for_request(state: &AppState, ip: &str) -> Option<String> {
    state.asn_lookup.lookup(state.kv.as_ref(), ip).await
}
