//! The C source injector and WASM compiler driver (§4.2): renders the
//! fixed C template with per-build constants, then shells out to
//! `clang --target=wasm32` to produce the module the host loads.

pub mod compiler;
pub mod template;

use std::collections::BTreeMap;
use std::path::Path;

use vmgate_core::manifest::Manifest;

pub use compiler::{compile_to_wasm, CompileError, DEFAULT_TIMEOUT, EXPORTS};
pub use template::{render, Placeholder, TemplateError, VM_TEMPLATE};

/// Build the placeholder table for a manifest and render the final C
/// source, ready to hand to [`compile_to_wasm`].
pub fn render_manifest(manifest: &Manifest, build_tag: &str) -> Result<String, TemplateError> {
    let mut values = BTreeMap::new();
    values.insert("BUILD_TAG", Placeholder::CString(build_tag.to_string()));
    values.insert(
        "ACTION_COUNT",
        Placeholder::IntLiteral(vmgate_core::action::ACTION_COUNT as i64),
    );
    values.insert("VM_TABLE", Placeholder::ArrayLiteral(manifest.vm.to_vec()));
    values.insert(
        "VM_INV_TABLE",
        Placeholder::ArrayLiteral(manifest.vm_inv.to_vec()),
    );
    values.insert(
        "OPCODE_ACTION_TABLE",
        Placeholder::ArrayLiteral(manifest.opcode_action.to_vec()),
    );
    values.insert("ENTRY_DISPATCH", Placeholder::Verbatim(String::new()));
    render(VM_TEMPLATE, &values)
}

/// Render and compile in one step.
pub fn build_wasm(
    manifest: &Manifest,
    build_tag: &str,
    work_dir: &Path,
    clang_path: &str,
) -> anyhow::Result<Vec<u8>> {
    let source = render_manifest(manifest, build_tag)?;
    let wasm = compile_to_wasm(&source, work_dir, clang_path)?;
    Ok(wasm)
}
