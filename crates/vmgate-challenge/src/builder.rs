//! Challenge generation (§4.6): draw a random layered bytecode program
//! over the manifest's admissible opcodes, run it against random input to
//! get the expected answer, compile+encrypt the WASM module, and hand
//! back everything the client needs to re-derive the answer itself.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{thread_rng, Rng};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vmgate_core::action::Action;
use vmgate_core::manifest::Manifest;
use vmgate_core::vm::{self, Operation};
use vmgate_kv::KvStore;

use crate::token::{sign_challenge_token, TokenError};

/// How long a generated challenge's expected answer stays claimable (§6
/// `challenge:{id}`).
pub const CHALLENGE_TTL: Duration = Duration::from_secs(300);

const MIN_OPS: u32 = 8;
const MAX_OPS: u32 = 15;
const MIN_LAYERS: u32 = 2;
const MAX_LAYERS: u32 = 5;
const MAX_PARAM_LEN: usize = 7;
const INPUT_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("manifest has no opcodes bound to admissible actions")]
    NoAdmissibleOpcodes,
    #[error("vm execution failed: {0}")]
    Vm(#[from] vm::VmError),
    #[error("kv error: {0}")]
    Kv(#[from] vmgate_kv::KvError),
    #[error("token signing failed: {0}")]
    Token(#[from] TokenError),
    #[error("aead encryption failed: {0}")]
    Aead(#[from] vmgate_crypto::AeadError),
}

/// A single instruction as shipped to the client: opcode plus hex-encoded
/// parameter blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationDto {
    pub op: u8,
    pub params: String,
}

/// Everything a solver needs: the encrypted WASM module, the key to
/// decrypt it under, the bytecode program to run, and the input to run it
/// against. `token` binds the solution to this specific challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
    #[serde(rename = "encryptedWasm")]
    pub encrypted_wasm: String,
    #[serde(rename = "wasmKey")]
    pub wasm_key: String,
    pub operations: Vec<OperationDto>,
    pub input: String,
    pub token: String,
}

/// Non-wire companion data the server keeps to itself.
pub struct ChallengeCredential {
    pub challenge: Challenge,
    pub expected: u32,
}

/// Build a new challenge against `manifest`, persisting its expected
/// answer under `challenge:{id}` and signing a JWT for `token`.
///
/// `wasm_bytes` is the already-compiled module for this build (§9: the
/// compiler is a pre-build step, not run on the request hot path) — every
/// challenge ships the same module under a freshly generated one-shot key.
pub async fn build_challenge(
    manifest: &Manifest,
    wasm_bytes: &[u8],
    token_secret: &[u8],
    kv: &dyn KvStore,
) -> Result<ChallengeCredential, BuildError> {
    build_challenge_with_ttl(manifest, wasm_bytes, token_secret, kv, CHALLENGE_TTL).await
}

/// Same as [`build_challenge`], with the claim window taken from the
/// deployment's `CHALLENGE_TTL_SECS` instead of the default.
pub async fn build_challenge_with_ttl(
    manifest: &Manifest,
    wasm_bytes: &[u8],
    token_secret: &[u8],
    kv: &dyn KvStore,
    ttl: Duration,
) -> Result<ChallengeCredential, BuildError> {
    let admissible = admissible_opcodes(manifest);
    if admissible.is_empty() {
        return Err(BuildError::NoAdmissibleOpcodes);
    }

    let ops = generate_layered_program(&admissible);
    let mut input = [0u8; INPUT_LEN];
    OsRng.fill_bytes(&mut input);

    let result = vm::run(&input, &ops, manifest)?;
    let expected = if result.len() >= 4 {
        u32::from_le_bytes([result[0], result[1], result[2], result[3]])
    } else {
        0
    };

    let mut wasm_key = [0u8; 32];
    OsRng.fill_bytes(&mut wasm_key);
    let encrypted_wasm = vmgate_crypto::pack_encrypt(&wasm_key, wasm_bytes)?;

    let challenge_id = random_hex(16);
    kv.set(&format!("challenge:{challenge_id}"), &expected.to_string(), ttl).await?;
    let token = sign_challenge_token(token_secret, &challenge_id, ttl)?;

    let challenge = Challenge {
        challenge_id,
        encrypted_wasm: STANDARD.encode(encrypted_wasm),
        wasm_key: hex::encode(wasm_key),
        operations: ops
            .iter()
            .map(|op| OperationDto { op: op.op, params: hex::encode(&op.params) })
            .collect(),
        input: hex::encode(input),
        token,
    };

    Ok(ChallengeCredential { challenge, expected })
}

/// Opcodes bound to an action the builder is allowed to draw from.
fn admissible_opcodes(manifest: &Manifest) -> Vec<u8> {
    (0u16..256)
        .filter_map(|opcode| {
            let idx = manifest.opcode_action[opcode as usize];
            let action = Action::from_index(idx)?;
            action.admissible_for_puzzle().then_some(opcode as u8)
        })
        .collect()
}

/// Draw `numLayers` layers of `numOps` total instructions (§4.6 steps
/// 2-4): partition the op count into non-empty layers, fill each with
/// random admissible instructions, shuffle within the layer, and
/// concatenate layers in order.
fn generate_layered_program(admissible: &[u8]) -> Vec<Operation> {
    let mut rng = thread_rng();
    let num_ops = rng.gen_range(MIN_OPS..=MAX_OPS);
    let num_layers = rng.gen_range(MIN_LAYERS..=MAX_LAYERS.min(num_ops));

    let layer_sizes = partition_into_layers(&mut rng, num_ops, num_layers);

    let mut ops = Vec::with_capacity(num_ops as usize);
    for size in layer_sizes {
        let mut layer: Vec<Operation> = (0..size)
            .map(|_| random_operation(&mut rng, admissible))
            .collect();
        // Fisher-Yates shuffle within the layer (§4.6 step 4).
        for i in (1..layer.len()).rev() {
            let j = rng.gen_range(0..=i);
            layer.swap(i, j);
        }
        ops.extend(layer);
    }
    ops
}

fn partition_into_layers(rng: &mut impl Rng, num_ops: u32, num_layers: u32) -> Vec<u32> {
    let mut sizes = vec![1u32; num_layers as usize];
    let mut remaining = num_ops - num_layers;
    while remaining > 0 {
        let idx = rng.gen_range(0..num_layers as usize);
        sizes[idx] += 1;
        remaining -= 1;
    }
    sizes
}

fn random_operation(rng: &mut impl Rng, admissible: &[u8]) -> Operation {
    let op = admissible[rng.gen_range(0..admissible.len())];
    let param_len = rng.gen_range(0..=MAX_PARAM_LEN);
    let params = (0..param_len).map(|_| rng.gen::<u8>()).collect();
    Operation::new(op, params)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmgate_core::action::UNASSIGNED;

    fn identity_manifest() -> Manifest {
        let mut opcode_action = [UNASSIGNED; 256];
        for i in 0..vmgate_core::action::ACTION_COUNT {
            opcode_action[i] = i as u8;
        }
        let mut vm = [0u8; 256];
        for i in 0..256 {
            vm[i] = i as u8;
        }
        let vm_inv = vm;
        Manifest::new(opcode_action, vm, vm_inv).unwrap()
    }

    #[test]
    fn admissible_opcodes_exclude_forward_only_and_hex_actions() {
        let manifest = identity_manifest();
        let admissible = admissible_opcodes(&manifest);
        assert!(!admissible.contains(&(Action::ChachaDecrypt as u8)));
        assert!(!admissible.contains(&(Action::ToHex as u8)));
        assert!(!admissible.contains(&(Action::FromHex as u8)));
        assert_eq!(admissible.len(), vmgate_core::action::ACTION_COUNT - 3);
    }

    #[test]
    fn layered_program_has_between_8_and_15_ops() {
        let manifest = identity_manifest();
        let admissible = admissible_opcodes(&manifest);
        for _ in 0..20 {
            let ops = generate_layered_program(&admissible);
            assert!(ops.len() >= MIN_OPS as usize && ops.len() <= MAX_OPS as usize);
            for op in &ops {
                assert!(admissible.contains(&op.op));
                assert!(op.params.len() <= MAX_PARAM_LEN);
            }
        }
    }

    #[test]
    fn partition_sums_to_num_ops_with_no_empty_layer() {
        let mut rng = rand::rngs::mock::StepRng::new(7, 11);
        let sizes = partition_into_layers(&mut rng, 12, 4);
        assert_eq!(sizes.len(), 4);
        assert_eq!(sizes.iter().sum::<u32>(), 12);
        assert!(sizes.iter().all(|&s| s >= 1));
    }

    #[tokio::test]
    async fn build_challenge_persists_expected_and_signs_token() {
        use crate::token::verify_challenge_token;
        use vmgate_kv::InMemoryKv;

        let manifest = identity_manifest();
        let kv = InMemoryKv::new();
        let secret = b"0123456789abcdef0123456789abcdef";
        let fake_wasm = b"not a real module, just bytes to encrypt";

        let credential = build_challenge(&manifest, fake_wasm, secret, &kv).await.unwrap();
        let challenge_id = verify_challenge_token(secret, &credential.challenge.token).unwrap();
        assert_eq!(challenge_id, credential.challenge.challenge_id);

        let stored = kv
            .get(&format!("challenge:{challenge_id}"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.parse::<u32>().unwrap(), credential.expected);
    }
}
