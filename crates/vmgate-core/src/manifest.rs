//! The per-build manifest: the S-box permutation and its inverse, and the
//! opcode→action assignment table, all serialized as `bytecodes.json` (§6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{Action, ACTION_COUNT, ACTION_NAMES, UNASSIGNED};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("opcode_action must have 256 entries, got {0}")]
    BadOpcodeActionLen(usize),
    #[error("vm must have 256 entries, got {0}")]
    BadVmLen(usize),
    #[error("vm_inv must have 256 entries, got {0}")]
    BadVmInvLen(usize),
    #[error("vm is not a permutation of 0..=255")]
    VmNotPermutation,
    #[error("vm_inv does not invert vm: vm_inv[vm[{0}]] == {1}, expected {0}")]
    VmInvMismatch(usize, u8),
    #[error("expected exactly {ACTION_COUNT} opcodes bound to actions, found {0}")]
    WrongBoundCount(usize),
    #[error("action index {0} is bound to more than one opcode")]
    DuplicateAction(u8),
    #[error("opcode_action entry {0} is out of range: {1}")]
    OutOfRangeAction(usize, u8),
}

/// The four-field JSON document written by the bytecode generator and
/// consumed by both the server and the WASM host (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// `"0x<hh>" → action name`, 19 entries.
    pub bytecodes: BTreeMap<String, String>,
    #[serde(with = "big_array_256")]
    pub opcode_action: [u8; 256],
    #[serde(with = "big_array_256")]
    pub vm: [u8; 256],
    #[serde(with = "big_array_256")]
    pub vm_inv: [u8; 256],
}

impl Manifest {
    /// Builds a manifest from its three generated tables, deriving the
    /// `bytecodes` hex→name map by inverting `opcode_action`.
    pub fn new(opcode_action: [u8; 256], vm: [u8; 256], vm_inv: [u8; 256]) -> Result<Self, ManifestError> {
        let mut bytecodes = BTreeMap::new();
        let mut seen_actions = [false; ACTION_COUNT];
        let mut bound = 0usize;
        for (opcode, &idx) in opcode_action.iter().enumerate() {
            if idx == UNASSIGNED {
                continue;
            }
            if idx as usize >= ACTION_COUNT {
                return Err(ManifestError::OutOfRangeAction(opcode, idx));
            }
            if seen_actions[idx as usize] {
                return Err(ManifestError::DuplicateAction(idx));
            }
            seen_actions[idx as usize] = true;
            bound += 1;
            bytecodes.insert(format!("0x{:02x}", opcode), ACTION_NAMES[idx as usize].to_string());
        }
        if bound != ACTION_COUNT {
            return Err(ManifestError::WrongBoundCount(bound));
        }

        let manifest = Manifest {
            bytecodes,
            opcode_action,
            vm,
            vm_inv,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Re-checks every invariant in §3/§8: `vm_inv[vm[i]] == i` for all i,
    /// exactly 19 bound opcodes with distinct action indices.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.opcode_action.len() != 256 {
            return Err(ManifestError::BadOpcodeActionLen(self.opcode_action.len()));
        }
        if self.vm.len() != 256 {
            return Err(ManifestError::BadVmLen(self.vm.len()));
        }
        if self.vm_inv.len() != 256 {
            return Err(ManifestError::BadVmInvLen(self.vm_inv.len()));
        }

        let mut seen = [false; 256];
        for &b in self.vm.iter() {
            seen[b as usize] = true;
        }
        if seen.iter().any(|&s| !s) {
            return Err(ManifestError::VmNotPermutation);
        }

        for i in 0..256usize {
            let inv = self.vm_inv[self.vm[i] as usize];
            if inv as usize != i {
                return Err(ManifestError::VmInvMismatch(i, inv));
            }
        }

        let mut seen_actions = [false; ACTION_COUNT];
        let mut bound = 0usize;
        for &idx in self.opcode_action.iter() {
            if idx == UNASSIGNED {
                continue;
            }
            if idx as usize >= ACTION_COUNT {
                return Err(ManifestError::OutOfRangeAction(0, idx));
            }
            if seen_actions[idx as usize] {
                return Err(ManifestError::DuplicateAction(idx));
            }
            seen_actions[idx as usize] = true;
            bound += 1;
        }
        if bound != ACTION_COUNT {
            return Err(ManifestError::WrongBoundCount(bound));
        }

        Ok(())
    }

    /// Action bound to `opcode`, or `None` if unassigned.
    pub fn action_for(&self, opcode: u8) -> Option<Action> {
        let idx = self.opcode_action[opcode as usize];
        if idx == UNASSIGNED {
            None
        } else {
            Action::from_index(idx)
        }
    }

    /// The opcode byte chosen for a given action, for challenge generation
    /// and tests that need to go from semantics back to wire opcode.
    pub fn opcode_for_action(&self, action: Action) -> Option<u8> {
        self.opcode_action
            .iter()
            .position(|&idx| idx == action as u8)
            .map(|p| p as u8)
    }
}

/// Manual serde impl for `[u8; 256]`, which has no built-in array support
/// at this length.
mod big_array_256 {
    use serde::de::{Error as DeError, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(arr: &[u8; 256], s: S) -> Result<S::Ok, S::Error> {
        let mut tup = s.serialize_tuple(256)?;
        for b in arr {
            tup.serialize_element(b)?;
        }
        tup.end()
    }

    struct ArrVisitor;

    impl<'de> Visitor<'de> for ArrVisitor {
        type Value = [u8; 256];

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an array of 256 integers")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = [0u8; 256];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| DeError::invalid_length(i, &self))?;
            }
            Ok(out)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 256], D::Error> {
        d.deserialize_tuple(256, ArrVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_manifest() -> Manifest {
        let mut opcode_action = [UNASSIGNED; 256];
        for i in 0..ACTION_COUNT {
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
    fn identity_manifest_validates() {
        let m = identity_manifest();
        assert!(m.validate().is_ok());
        assert_eq!(m.bytecodes.len(), ACTION_COUNT);
    }

    #[test]
    fn rejects_non_inverting_vm_inv() {
        let mut opcode_action = [UNASSIGNED; 256];
        for i in 0..ACTION_COUNT {
            opcode_action[i] = i as u8;
        }
        let mut vm = [0u8; 256];
        for i in 0..256 {
            vm[i] = i as u8;
        }
        let mut vm_inv = vm;
        vm_inv.swap(0, 1);
        assert!(matches!(
            Manifest::new(opcode_action, vm, vm_inv),
            Err(ManifestError::VmInvMismatch(_, _))
        ));
    }

    #[test]
    fn rejects_wrong_bound_count() {
        let mut opcode_action = [UNASSIGNED; 256];
        opcode_action[0] = 0;
        let mut vm = [0u8; 256];
        for i in 0..256 {
            vm[i] = i as u8;
        }
        let vm_inv = vm;
        assert!(matches!(
            Manifest::new(opcode_action, vm, vm_inv),
            Err(ManifestError::WrongBoundCount(1))
        ));
    }

    #[test]
    fn roundtrips_through_json() {
        let m = identity_manifest();
        let json = serde_json::to_string(&m).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vm, m.vm);
        assert_eq!(back.opcode_action, m.opcode_action);
        assert_eq!(back.bytecodes, m.bytecodes);
    }

    #[test]
    fn action_for_and_opcode_for_action_are_consistent() {
        let m = identity_manifest();
        for i in 0..ACTION_COUNT as u8 {
            let opcode = m.opcode_for_action(Action::from_index(i).unwrap()).unwrap();
            assert_eq!(m.action_for(opcode), Action::from_index(i));
        }
    }
}
