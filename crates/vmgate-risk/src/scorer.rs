//! Weighted header/ASN risk scorer (§4.7 "Header/ASN scorer").
//!
//! Weights below are the concrete defaults for the tunable reference
//! table the specification leaves open; see the project's design ledger
//! for the reasoning.

use once_cell::sync::Lazy;
use regex::Regex;
use vmgate_kv::KvStore;

use crate::asn::AsnTable;

const WEIGHT_BOT_UA: f64 = 0.35;
const WEIGHT_UA_NOT_BROWSER: f64 = 0.05;
const WEIGHT_ORIGIN_MISSING: f64 = 0.05;
const WEIGHT_REFERER_MISSING: f64 = 0.02;
const WEIGHT_HEADLESS_CH_UA: f64 = 0.15;
const WEIGHT_VIA_CHAIN: f64 = 0.05;
const ASN_SCALE: f64 = 0.2;
const ASN_CAP: f64 = 0.2;
const ASN_DYNAMIC_BUMP: f64 = 0.1;
const ASN_DYNAMIC_THRESHOLD: usize = 5;
const BLOCK_THRESHOLD: f64 = 0.45;
const VIA_CHAIN_MIN_LEN: usize = 3;

static BOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bot|crawler|spider|headless|curl|wget|python-requests|scrapy|phantomjs")
        .expect("static bot-pattern regex is valid")
});

static LEGIT_BROWSER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Mozilla/5\.0").expect("static browser-token regex is valid")
});

/// The subset of a request's headers the scorer cares about, extracted by
/// the route handler so this crate never touches an HTTP framework type.
#[derive(Debug, Clone, Default)]
pub struct RequestSignals<'a> {
    pub ip: &'a str,
    pub user_agent: Option<&'a str>,
    pub origin: Option<&'a str>,
    pub referer: Option<&'a str>,
    pub sec_ch_ua: Option<&'a str>,
    pub via: Option<&'a str>,
    pub asn: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub score: f64,
    pub reasons: Vec<String>,
    pub blocked: bool,
}

pub async fn score_request(
    signals: &RequestSignals<'_>,
    asn_table: &AsnTable,
    kv: &dyn KvStore,
) -> ScoreResult {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    match signals.user_agent {
        None => {
            score += WEIGHT_BOT_UA;
            reasons.push("missing user-agent".to_string());
        }
        Some(ua) if BOT_PATTERN.is_match(ua) => {
            score += WEIGHT_BOT_UA;
            reasons.push("bot-pattern user-agent".to_string());
        }
        Some(ua) if !LEGIT_BROWSER_TOKEN.is_match(ua) => {
            score += WEIGHT_UA_NOT_BROWSER;
            reasons.push("non-browser user-agent token".to_string());
        }
        Some(_) => {}
    }

    if signals.origin.map(|o| o.parse::<url_lite::Origin>().is_err()).unwrap_or(true) {
        score += WEIGHT_ORIGIN_MISSING;
        reasons.push("origin missing or unparseable".to_string());
    }

    if signals.referer.is_none() {
        score += WEIGHT_REFERER_MISSING;
        reasons.push("referer absent".to_string());
    }

    if signals
        .sec_ch_ua
        .map(|h| h.to_ascii_lowercase().contains("headless"))
        .unwrap_or(false)
    {
        score += WEIGHT_HEADLESS_CH_UA;
        reasons.push("sec-ch-ua reports headless".to_string());
    }

    if let Some(via) = signals.via {
        if via.split(',').count() >= VIA_CHAIN_MIN_LEN {
            score += WEIGHT_VIA_CHAIN;
            reasons.push("long via chain".to_string());
        }
    }

    if let Some(asn) = signals.asn {
        let base = (asn_table.base_score(asn) * ASN_SCALE).min(ASN_CAP);
        score += base;
        if base > 0.0 {
            reasons.push(format!("asn base score for {asn}"));
        }

        let blocked_count = kv
            .s_members(&format!("risk:asn:{asn}"))
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if blocked_count >= ASN_DYNAMIC_THRESHOLD {
            score += ASN_DYNAMIC_BUMP;
            reasons.push(format!("asn {asn} has {blocked_count} previously blocked IPs"));
        }
    }

    let score = score.min(1.0);
    let blocked = score >= BLOCK_THRESHOLD;
    ScoreResult { score, reasons, blocked }
}

/// Minimal origin-header shape check: this crate does not want a full URL
/// parser dependency just to validate `scheme://host[:port]`.
mod url_lite {
    use std::str::FromStr;

    pub struct Origin;

    impl FromStr for Origin {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let (scheme, rest) = s.split_once("://").ok_or(())?;
            if scheme.is_empty() || rest.is_empty() {
                return Err(());
            }
            if !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(());
            }
            Ok(Origin)
        }
    }
}
