//! Cross-checks the compiled WASM module's `vm_run` against the Rust
//! reference `vmgate_core::vm::run` for the same manifest, ops, and input
//! (§8 "∀ (input, ops, manifest): reference_run(...) == wasm_run(...)
//! byte-for-byte"). Skipped if no `clang` capable of `--target=wasm32` is
//! available in `$PATH`, mirroring how `vmgate-codegen`'s own compiler
//! tests treat a missing toolchain.

use std::process::{Command, Stdio};

use vmgate_core::action::Action;
use vmgate_core::vm::{run, Operation};
use vmgate_wasmhost::WasmHost;

fn clang_available() -> bool {
    Command::new("clang")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[test]
fn wasm_run_matches_reference_run_for_a_multi_op_multi_layer_program() {
    if !clang_available() {
        eprintln!("skipping: no clang in PATH to compile the wasm module");
        return;
    }

    let manifest = vmgate_bytecode::generate().expect("manifest generation");
    let work_dir = tempfile::tempdir().expect("tempdir");
    let wasm_bytes = vmgate_codegen::build_wasm(&manifest, "parity-test", work_dir.path(), "clang")
        .expect("wasm build");

    let opcode_for = |a: Action| manifest.opcode_for_action(a).expect("action bound to an opcode");

    // Two layers: a mix of buffer-length-preserving actions spanning xor,
    // rotation, the S-box, and byte-order reversal.
    let ops = vec![
        Operation::new(opcode_for(Action::XorBuf), vec![0x5A, 0x3C]),
        Operation::new(opcode_for(Action::Rotl32), vec![7]),
        Operation::new(opcode_for(Action::VmApply), vec![]),
        Operation::new(opcode_for(Action::Swap32), vec![]),
        Operation::new(opcode_for(Action::Rotr32), vec![3]),
        Operation::new(opcode_for(Action::XorInplace), vec![0x11]),
    ];
    let input = vec![10u8, 20, 30, 40, 50, 60, 70, 80];

    let reference = run(&input, &ops, &manifest).expect("reference run");

    let mut host = WasmHost::load(&wasm_bytes).expect("wasm host load");
    let wasm_result = host.run(&input, &ops).expect("wasm run");

    assert_eq!(
        wasm_result, reference,
        "wasm vm_run diverged from the rust reference run for the same manifest and ops"
    );
}
