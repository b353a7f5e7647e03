//! ASN base-score table and the external IP→ASN lookup used by the
//! header/ASN scorer (§4.7, §6 `risk:ipasn:{ip}` / `risk:asn:{asn}`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use vmgate_kv::KvStore;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const SUCCESS_TTL: Duration = Duration::from_secs(86_400);
const FAILURE_TTL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Error)]
pub enum AsnError {
    #[error("failed to read ASN table at {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse ASN table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// `{asn: baseScore}` loaded from `ASN_TABLE_PATH` (§6). Scores are raw
/// (pre-scaling); the scorer applies the 0.2 multiplier and cap itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsnTable {
    scores: BTreeMap<String, f64>,
}

impl AsnTable {
    pub fn load(path: &Path) -> Result<Self, AsnError> {
        let raw = fs::read_to_string(path).map_err(|source| AsnError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn base_score(&self, asn: &str) -> f64 {
        self.scores.get(asn).copied().unwrap_or(0.0)
    }

    pub fn from_scores(scores: BTreeMap<String, f64>) -> Self {
        Self { scores }
    }
}

/// External IP→ASN lookup, with the 2 s timeout and KV-backed caching
/// mandated by §5 "Timeouts".
pub struct AsnLookup {
    http: reqwest::Client,
    /// Base URL of a pluggable lookup service; a GET to `{base}/{ip}` must
    /// return `{"asn": "AS<number>"}`. Configured via `ASN_LOOKUP_URL`.
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    asn: String,
}

impl AsnLookup {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { http, base_url }
    }

    /// Look up the ASN for `ip`, consulting and populating the
    /// `risk:ipasn:{ip}` cache first.
    pub async fn lookup(&self, kv: &dyn KvStore, ip: &str) -> Option<String> {
        let cache_key = format!("risk:ipasn:{ip}");
        if let Ok(Some(cached)) = kv.get(&cache_key).await {
            return if cached.is_empty() { None } else { Some(cached) };
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<LookupResponse>().await {
                Ok(parsed) => {
                    let _ = kv.set(&cache_key, &parsed.asn, SUCCESS_TTL).await;
                    Some(parsed.asn)
                }
                Err(_) => {
                    let _ = kv.set(&cache_key, "", FAILURE_TTL).await;
                    None
                }
            },
            _ => {
                let _ = kv.set(&cache_key, "", FAILURE_TTL).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_asn_scores_zero() {
        let table = AsnTable::default();
        assert_eq!(table.base_score("AS64512"), 0.0);
    }

    #[test]
    fn table_loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asn.json");
        fs::write(&path, r#"{"AS64512": 0.8}"#).unwrap();
        let table = AsnTable::load(&path).unwrap();
        assert_eq!(table.base_score("AS64512"), 0.8);
    }
}
