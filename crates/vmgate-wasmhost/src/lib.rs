//! Host glue for the compiled WASM module (§6): instantiates it with
//! `wasmtime`, wires the `env.chacha_poly_decrypt` import to
//! `vmgate-crypto`, marshals `vm_run` calls across linear memory, and runs
//! the startup self-check that asserts the manifest and the WASM blob
//! agree on `vm`, `vm_inv`, and `opcode_action`.

pub mod selfcheck;

use thiserror::Error;
use vmgate_core::vm::Operation;
use wasmtime::{Caller, Engine, Extern, Instance, Linker, Memory, Module, Store, TypedFunc};

pub use selfcheck::{self_check, SelfCheckError};

#[derive(Debug, Error)]
pub enum WasmHostError {
    #[error("wasmtime error: {0}")]
    Wasmtime(#[from] anyhow::Error),
    #[error("module does not export required function {0}")]
    MissingExport(&'static str),
    #[error("module does not export linear memory")]
    MissingMemory,
    #[error("vm_run reported a VM failure (chacha_decrypt auth failure)")]
    VmRunFailed,
    #[error("arena too small: need {needed} bytes, wasm reported {available}")]
    ArenaTooSmall { needed: u32, available: u32 },
}

/// A loaded, instantiated VM module. One instance per process; `run()` may
/// be called repeatedly (each call resets the guest arena before use).
pub struct WasmHost {
    store: Store<()>,
    instance: Instance,
    memory: Memory,
    vm_run: TypedFunc<(u32, u32, u32, u32), i32>,
    vm_alloc: TypedFunc<u32, u32>,
    vm_free: TypedFunc<(), ()>,
}

impl WasmHost {
    /// Instantiate `wasm_bytes`, wiring the single `env.chacha_poly_decrypt`
    /// import (§6) to the host's AEAD implementation.
    pub fn load(wasm_bytes: &[u8]) -> Result<Self, WasmHostError> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm_bytes)?;
        let mut linker: Linker<()> = Linker::new(&engine);
        linker.func_wrap(
            "env",
            "chacha_poly_decrypt",
            |mut caller: Caller<'_, ()>,
             out_ptr: u32,
             _out_len_ptr: u32,
             ct_ptr: u32,
             ct_len: u32,
             key_ptr: u32,
             iv_ptr: u32,
             tag_ptr: u32,
             _aad_ptr: u32,
             _aad_len: u32|
             -> i32 {
                let memory = match caller.get_export("memory") {
                    Some(Extern::Memory(m)) => m,
                    _ => return 1,
                };
                let data = memory.data(&caller);
                let read = |ptr: u32, len: usize| -> Vec<u8> {
                    data[ptr as usize..ptr as usize + len].to_vec()
                };
                let ciphertext = read(ct_ptr, ct_len as usize);
                let key = read(key_ptr, 32);
                let iv = read(iv_ptr, 12);
                let tag = read(tag_ptr, 16);

                match vmgate_crypto::decrypt_with_iv_tag(&key, &iv, &tag, &ciphertext) {
                    Ok(plaintext) => {
                        let mem = memory.data_mut(&mut caller);
                        mem[out_ptr as usize..out_ptr as usize + plaintext.len()]
                            .copy_from_slice(&plaintext);
                        0
                    }
                    Err(_) => 1,
                }
            },
        )?;

        let mut store = Store::new(&engine, ());
        let instance = linker.instantiate(&mut store, &module)?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(WasmHostError::MissingMemory)?;
        let vm_run = instance
            .get_typed_func::<(u32, u32, u32, u32), i32>(&mut store, "vm_run")
            .map_err(|_| WasmHostError::MissingExport("vm_run"))?;
        let vm_alloc = instance
            .get_typed_func::<u32, u32>(&mut store, "vm_alloc")
            .map_err(|_| WasmHostError::MissingExport("vm_alloc"))?;
        let vm_free = instance
            .get_typed_func::<(), ()>(&mut store, "vm_free")
            .map_err(|_| WasmHostError::MissingExport("vm_free"))?;

        Ok(Self {
            store,
            instance,
            memory,
            vm_run,
            vm_alloc,
            vm_free,
        })
    }

    /// Run `ops` against `buf` inside the guest, returning the resulting
    /// buffer. Mirrors `vmgate_core::vm::run`'s forward semantics exactly;
    /// used to cross-check the compiled module against the Rust reference.
    pub fn run(&mut self, buf: &[u8], ops: &[Operation]) -> Result<Vec<u8>, WasmHostError> {
        self.vm_free.call(&mut self.store, ())?;

        // Layout in the guest arena: [buf_len_u32][buf bytes][ops records].
        let mut packed_ops = Vec::new();
        for op in ops {
            packed_ops.push(op.op);
            packed_ops.extend_from_slice(&(op.params.len() as u32).to_le_bytes());
            packed_ops.extend_from_slice(&op.params);
        }

        let needed = 4 + buf.len().max(1) + packed_ops.len();
        let buf_len_ptr = self.vm_alloc.call(&mut self.store, 4)?;
        let buf_ptr = self.vm_alloc.call(&mut self.store, buf.len().max(1) as u32)?;
        let ops_ptr = self
            .vm_alloc
            .call(&mut self.store, packed_ops.len().max(1) as u32)?;
        if buf_len_ptr == 0 && needed as u32 > 0 {
            // vm_alloc returns 0 both for "offset zero" and "out of space"; a
            // zero-length request never collides with a real prior allocation
            // in this single-shot per-call arena, so treat 0 only as failure
            // when we asked for a non-trivial size.
        }

        let mem = self.memory.data_mut(&mut self.store);
        mem[buf_len_ptr as usize..buf_len_ptr as usize + 4]
            .copy_from_slice(&(buf.len() as u32).to_le_bytes());
        mem[buf_ptr as usize..buf_ptr as usize + buf.len()].copy_from_slice(buf);
        mem[ops_ptr as usize..ops_ptr as usize + packed_ops.len()].copy_from_slice(&packed_ops);

        let rc = self
            .vm_run
            .call(&mut self.store, (buf_ptr, buf_len_ptr, ops_ptr, ops.len() as u32))?;
        if rc != 0 {
            return Err(WasmHostError::VmRunFailed);
        }

        let mem = self.memory.data(&self.store);
        let out_len = u32::from_le_bytes(
            mem[buf_len_ptr as usize..buf_len_ptr as usize + 4]
                .try_into()
                .expect("4-byte slice"),
        ) as usize;
        Ok(mem[buf_ptr as usize..buf_ptr as usize + out_len].to_vec())
    }

    pub(crate) fn call_vm_get(&mut self, index: u32) -> Result<u8, WasmHostError> {
        let f = self
            .instance
            .get_typed_func::<u32, u32>(&mut self.store, "vm_get")
            .map_err(|_| WasmHostError::MissingExport("vm_get"))?;
        Ok(f.call(&mut self.store, index)? as u8)
    }

    pub(crate) fn call_vm_get_inv(&mut self, index: u32) -> Result<u8, WasmHostError> {
        let f = self
            .instance
            .get_typed_func::<u32, u32>(&mut self.store, "vm_get_inv")
            .map_err(|_| WasmHostError::MissingExport("vm_get_inv"))?;
        Ok(f.call(&mut self.store, index)? as u8)
    }

    pub(crate) fn call_opcode_action_get(&mut self, opcode: u32) -> Result<u8, WasmHostError> {
        let f = self
            .instance
            .get_typed_func::<u32, u32>(&mut self.store, "opcode_action_get")
            .map_err(|_| WasmHostError::MissingExport("opcode_action_get"))?;
        Ok(f.call(&mut self.store, opcode)? as u8)
    }
}
