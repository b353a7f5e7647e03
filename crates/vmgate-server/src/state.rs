//! Shared application state: the config, the KV handle, and the read-only
//! manifest/WASM/ASN artifacts loaded once at startup (§5 "Shared resources").

use std::sync::Arc;

use anyhow::{Context, Result};
use vmgate_core::manifest::Manifest;
use vmgate_kv::KvStore;
use vmgate_risk::{AsnLookup, AsnTable};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv: Arc<dyn KvStore>,
    pub manifest: Arc<Manifest>,
    pub wasm_bytes: Arc<Vec<u8>>,
    pub asn_table: Arc<AsnTable>,
    pub asn_lookup: Arc<AsnLookup>,
}

impl AppState {
    /// Load the manifest and WASM module from disk, run the startup
    /// self-check (§9), and wire up the KV backend named by `KV_URL`.
    pub fn bootstrap(config: Config) -> Result<Self> {
        let manifest_raw = std::fs::read_to_string(&config.manifest_path)
            .with_context(|| format!("reading manifest at {}", config.manifest_path))?;
        let manifest: Manifest = serde_json::from_str(&manifest_raw).context("parsing manifest JSON")?;

        let wasm_bytes = std::fs::read(&config.wasm_path)
            .with_context(|| format!("reading wasm module at {}", config.wasm_path))?;

        let mut host = vmgate_wasmhost::WasmHost::load(&wasm_bytes).context("loading wasm module")?;
        vmgate_wasmhost::self_check(&mut host, &manifest).context("manifest/wasm self-check")?;

        let asn_table = if std::path::Path::new(&config.asn_table_path).exists() {
            vmgate_risk::AsnTable::load(std::path::Path::new(&config.asn_table_path))
                .context("loading ASN table")?
        } else {
            tracing::warn!(path = %config.asn_table_path, "no ASN table on disk, starting with an empty one");
            vmgate_risk::AsnTable::default()
        };

        let kv: Arc<dyn KvStore> = if config.kv_url.starts_with("memory") {
            Arc::new(vmgate_kv::InMemoryKv::new())
        } else {
            Arc::new(vmgate_kv::RedisKv::new(&config.kv_url).context("connecting to KV store")?)
        };

        let asn_lookup = Arc::new(AsnLookup::new(config.asn_lookup_url.clone()));

        Ok(AppState {
            config: Arc::new(config),
            kv,
            manifest: Arc::new(manifest),
            wasm_bytes: Arc::new(wasm_bytes),
            asn_table: Arc::new(asn_table),
            asn_lookup,
        })
    }
}
