//! The 19 canonical buffer-transform actions and their fixed assignment
//! order (§4.1: "assigned to action names in the canonical fixed order").

/// Number of distinct actions the VM can dispatch. `opcode_action` entries
/// are either `0..ACTION_COUNT` or the sentinel `255` ("unassigned").
pub const ACTION_COUNT: usize = 19;

/// Sentinel `opcode_action` value meaning "no action bound to this opcode".
pub const UNASSIGNED: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    VmApply = 0,
    VmApplyInv = 1,
    XorBuf = 2,
    XorInplace = 3,
    Crc32 = 4,
    Adler32 = 5,
    XorChecksum = 6,
    ToHex = 7,
    FromHex = 8,
    ReadU32Be = 9,
    WriteU32Be = 10,
    ReadU32Le = 11,
    WriteU32Le = 12,
    Rotl32 = 13,
    Rotr32 = 14,
    Swap32 = 15,
    GetBit = 16,
    SetBit = 17,
    ChachaDecrypt = 18,
}

/// The canonical action name list, in assignment order. `bytecode-gen`
/// walks this array when handing out the 19 chosen opcodes.
pub const ACTION_NAMES: [&str; ACTION_COUNT] = [
    "vm_apply",
    "vm_apply_inv",
    "xor_buf",
    "xor_inplace",
    "crc32",
    "adler32",
    "xor_checksum",
    "to_hex",
    "from_hex",
    "read_u32be",
    "write_u32be",
    "read_u32le",
    "write_u32le",
    "rotl32",
    "rotr32",
    "swap32",
    "get_bit",
    "set_bit",
    "chacha_decrypt",
];

impl Action {
    pub fn from_index(idx: u8) -> Option<Action> {
        use Action::*;
        Some(match idx {
            0 => VmApply,
            1 => VmApplyInv,
            2 => XorBuf,
            3 => XorInplace,
            4 => Crc32,
            5 => Adler32,
            6 => XorChecksum,
            7 => ToHex,
            8 => FromHex,
            9 => ReadU32Be,
            10 => WriteU32Be,
            11 => ReadU32Le,
            12 => WriteU32Le,
            13 => Rotl32,
            14 => Rotr32,
            15 => Swap32,
            16 => GetBit,
            17 => SetBit,
            18 => ChachaDecrypt,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        ACTION_NAMES[self as usize]
    }

    /// Actions the challenge builder must never select for a puzzle
    /// (§4.6 step 1 and the corresponding design notes in §9).
    pub fn admissible_for_puzzle(self) -> bool {
        !matches!(
            self,
            Action::ChachaDecrypt | Action::ToHex | Action::FromHex
        )
    }

    /// Actions whose forward effect the encoder can invert (§3 invariants:
    /// "for every opcode whose action is invertible"). Excludes the
    /// checksum overwrites (4/5/6, idempotent but not invertible), the
    /// length-changing hex actions (7/8), and chacha_decrypt (18, forward-only).
    pub fn invertible(self) -> bool {
        !matches!(
            self,
            Action::Crc32
                | Action::Adler32
                | Action::XorChecksum
                | Action::ToHex
                | Action::FromHex
                | Action::ChachaDecrypt
        )
    }
}
