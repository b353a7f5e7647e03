//! Pre-build step (§9 "Design notes"): generate a fresh manifest, render
//! and compile its C source to WASM, and write both artifacts to disk so
//! `vmgate-server` can load them verbatim at startup. Run once per
//! deployment build, never on a request path.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(about = "Generate a manifest and compile its matching WASM module")]
struct Args {
    /// Directory to write bytecodes.json and vm.wasm into.
    #[arg(long, default_value = "./")]
    out_dir: PathBuf,

    /// Build tag embedded in the compiled module (no semantic meaning to
    /// the VM, just a breadcrumb for support).
    #[arg(long, default_value = "vmgate-dev")]
    build_tag: String,

    /// Path to the clang binary used to compile the wasm32 target.
    #[arg(long, default_value = "clang")]
    clang_path: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.out_dir).context("creating output directory")?;

    let manifest = vmgate_bytecode::generate().context("generating manifest")?;
    vmgate_bytecode::write_manifest(&args.out_dir, &manifest).context("writing manifest")?;

    let wasm = vmgate_codegen::build_wasm(&manifest, &args.build_tag, &args.out_dir, &args.clang_path)
        .context("compiling wasm module")?;
    let wasm_path = args.out_dir.join("vm.wasm");
    std::fs::write(&wasm_path, &wasm).with_context(|| format!("writing {}", wasm_path.display()))?;

    tracing::info!(
        out_dir = %args.out_dir.display(),
        wasm_bytes = wasm.len(),
        "build artifacts written"
    );
    Ok(())
}
