//! Per-build manifest generation (§4.1): two independent Fisher-Yates
//! shuffles over `0..=256`, one picking which 19 opcodes get bound to
//! actions, the other producing the S-box permutation `vm`.
//!
//! This crate is the only place in the workspace that touches the CSPRNG
//! used for per-build randomness; everything downstream consumes the
//! resulting [`Manifest`] as data.

use std::fs;
use std::io;
use std::path::Path;

use rand_core::{OsRng, RngCore};
use thiserror::Error;
use vmgate_core::action::ACTION_COUNT;
use vmgate_core::manifest::{Manifest, ManifestError};

#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("generated manifest failed validation: {0}")]
    Invalid(#[from] ManifestError),
    #[error("failed to write manifest to {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Draw a uniform value in `0..n` from `rng` using rejection sampling, so
/// the result carries no modulo bias (§4.1).
fn bounded_u32(rng: &mut impl RngCore, n: u32) -> u32 {
    assert!(n > 0);
    let limit = ((1u64 << 32) / n as u64 * n as u64) as u32;
    loop {
        let v = rng.next_u32();
        if limit == 0 || v < limit {
            return v % n;
        }
    }
}

/// Fisher-Yates shuffle of `0..=255` using `rng` for each draw.
fn shuffle_bytes(rng: &mut impl RngCore) -> [u8; 256] {
    let mut arr: [u8; 256] = core::array::from_fn(|i| i as u8);
    for i in (1..256usize).rev() {
        let j = bounded_u32(rng, (i + 1) as u32) as usize;
        arr.swap(i, j);
    }
    arr
}

fn invert(perm: &[u8; 256]) -> [u8; 256] {
    let mut inv = [0u8; 256];
    for (i, &p) in perm.iter().enumerate() {
        inv[p as usize] = i as u8;
    }
    inv
}

/// Generate a fresh manifest using the OS CSPRNG. Two independent shuffles
/// are drawn: the first's leading 19 bytes become the chosen opcodes
/// (assigned to action names in canonical fixed order), the second becomes
/// the S-box `vm`.
pub fn generate() -> Result<Manifest, BytecodeError> {
    generate_with(&mut OsRng)
}

/// Same as [`generate`], parameterized over the RNG so tests can use a
/// deterministic seeded source.
pub fn generate_with(rng: &mut impl RngCore) -> Result<Manifest, BytecodeError> {
    let opcode_shuffle = shuffle_bytes(rng);
    let mut opcode_action = [vmgate_core::action::UNASSIGNED; 256];
    let chosen = &opcode_shuffle[..ACTION_COUNT];
    for (action_idx, &opcode) in chosen.iter().enumerate() {
        if opcode_action[opcode as usize] != vmgate_core::action::UNASSIGNED {
            // Cannot happen with a correct shuffle (§4.1 "fail loudly").
            panic!("bytecode generator produced a colliding opcode: {opcode}");
        }
        opcode_action[opcode as usize] = action_idx as u8;
    }

    let vm = shuffle_bytes(rng);
    let vm_inv = invert(&vm);

    Ok(Manifest::new(opcode_action, vm, vm_inv)?)
}

/// Write the manifest to `<dir>/bytecodes.json`.
pub fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<(), BytecodeError> {
    let path = dir.join("bytecodes.json");
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, json).map_err(|source| BytecodeError::Io {
        path: path.display().to_string(),
        source,
    })
}
