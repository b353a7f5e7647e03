//! Startup self-check (§9 "Per-build randomness as build-time code
//! generation"): assert the manifest JSON and the compiled WASM blob agree
//! on `vm`, `vm_inv`, and `opcode_action` before serving any traffic.

use thiserror::Error;
use vmgate_core::manifest::Manifest;

use crate::{WasmHost, WasmHostError};

#[derive(Debug, Error)]
pub enum SelfCheckError {
    #[error("wasm host error during self-check: {0}")]
    Host(#[from] WasmHostError),
    #[error("vm[{index}] mismatch: manifest={manifest}, wasm={wasm}")]
    VmMismatch { index: usize, manifest: u8, wasm: u8 },
    #[error("vm_inv[{index}] mismatch: manifest={manifest}, wasm={wasm}")]
    VmInvMismatch { index: usize, manifest: u8, wasm: u8 },
    #[error("opcode_action[{index}] mismatch: manifest={manifest}, wasm={wasm}")]
    OpcodeActionMismatch { index: usize, manifest: u8, wasm: u8 },
}

/// Round-trip every entry of `vm`, `vm_inv`, and `opcode_action` through
/// the WASM module's `vm_get`/`vm_get_inv`/`opcode_action_get` exports and
/// assert they match the manifest the server loaded.
pub fn self_check(host: &mut WasmHost, manifest: &Manifest) -> Result<(), SelfCheckError> {
    for i in 0..256u32 {
        let wasm_vm = host.call_vm_get(i)?;
        if wasm_vm != manifest.vm[i as usize] {
            return Err(SelfCheckError::VmMismatch {
                index: i as usize,
                manifest: manifest.vm[i as usize],
                wasm: wasm_vm,
            });
        }
        let wasm_vm_inv = host.call_vm_get_inv(i)?;
        if wasm_vm_inv != manifest.vm_inv[i as usize] {
            return Err(SelfCheckError::VmInvMismatch {
                index: i as usize,
                manifest: manifest.vm_inv[i as usize],
                wasm: wasm_vm_inv,
            });
        }
        let wasm_action = host.call_opcode_action_get(i)?;
        if wasm_action != manifest.opcode_action[i as usize] {
            return Err(SelfCheckError::OpcodeActionMismatch {
                index: i as usize,
                manifest: manifest.opcode_action[i as usize],
                wasm: wasm_action,
            });
        }
    }
    tracing::info!("wasm self-check passed: vm, vm_inv, and opcode_action agree with manifest");
    Ok(())
}
