//! Server configuration (§6 "Configuration"), `Config::from_env()` in the
//! style of the RPC proxy's config loader: read, fall back to a sane
//! default, parse, and attach context to the error.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC key for challenge JWTs. Must be at least 32 characters.
    pub challenge_verify_secret: String,

    /// KV store endpoint. Only consulted when the `redis-backend` feature
    /// is compiled in; otherwise the process uses an in-memory store.
    pub kv_url: String,

    /// Enables `debug`-level logs on the `vmgate_risk` target.
    pub risk_debug: bool,

    /// Address the HTTP listener binds to.
    pub bind_addr: String,

    /// Path to the per-build manifest JSON written by `vmgate-bytecode`.
    pub manifest_path: String,

    /// Path to the compiled WASM module matching `manifest_path`.
    pub wasm_path: String,

    /// Path to the ASN base-score JSON table.
    pub asn_table_path: String,

    /// Seconds a generated challenge's expected answer stays claimable.
    pub challenge_ttl_secs: u64,

    /// Seconds a session stays valid after `GET /challenge`.
    pub session_ttl_secs: u64,

    /// Base URL of the external IP→ASN lookup service.
    pub asn_lookup_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let challenge_verify_secret = std::env::var("CHALLENGE_VERIFY_SECRET")
            .context("CHALLENGE_VERIFY_SECRET is required")?;
        if challenge_verify_secret.len() < 32 {
            anyhow::bail!("CHALLENGE_VERIFY_SECRET must be at least 32 characters");
        }

        Ok(Config {
            challenge_verify_secret,
            kv_url: std::env::var("KV_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
            risk_debug: std::env::var("RISK_DEBUG")
                .map(|v| v == "1")
                .unwrap_or(false),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            manifest_path: std::env::var("MANIFEST_PATH").unwrap_or_else(|_| "./bytecodes.json".into()),
            wasm_path: std::env::var("WASM_PATH").unwrap_or_else(|_| "./vm.wasm".into()),
            asn_table_path: std::env::var("ASN_TABLE_PATH")
                .unwrap_or_else(|_| "./asn-scores.json".into()),
            challenge_ttl_secs: std::env::var("CHALLENGE_TTL_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .context("Invalid CHALLENGE_TTL_SECS")?,
            session_ttl_secs: std::env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .context("Invalid SESSION_TTL_SECS")?,
            asn_lookup_url: std::env::var("ASN_LOOKUP_URL")
                .unwrap_or_else(|_| "http://localhost:9999/asn".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_secret_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CHALLENGE_VERIFY_SECRET");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn short_secret_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CHALLENGE_VERIFY_SECRET", "too-short");
        assert!(Config::from_env().is_err());
        std::env::remove_var("CHALLENGE_VERIFY_SECRET");
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(
            "CHALLENGE_VERIFY_SECRET",
            "0123456789abcdef0123456789abcdef",
        );
        let config = Config::from_env().unwrap();
        assert_eq!(config.kv_url, "redis://localhost:6379");
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.challenge_ttl_secs, 300);
        std::env::remove_var("CHALLENGE_VERIFY_SECRET");
    }
}
