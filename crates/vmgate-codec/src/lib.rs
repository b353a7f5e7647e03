//! Pure byte/int codecs, checksums, and bitwise primitives.
//!
//! Nothing here allocates more than its output buffer and nothing here can
//! fail except `from_hex`/`from_hex_bytes` on malformed input. Every
//! function is a direct, side-effect-free transform so both the host
//! reference VM and the C template handed to the WASM compiler can share
//! the same semantics by construction.

pub mod bits;
pub mod checksum;
pub mod hex;
pub mod intcodec;
pub mod varint;

pub use bits::{rotl32, rotr32, set_bit, swap32};
pub use checksum::{adler32, crc32, xor_checksum};
pub use hex::{from_hex, to_hex};
pub use intcodec::{read_u32_be, read_u32_le, write_u32_be, write_u32_le};
pub use varint::{read_varint, write_varint};
