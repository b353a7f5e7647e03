//! The VM core: the manifest data model, the 19-action dispatch table, and
//! the forward (`run`) and inverse (`encode`) reference implementations.
//!
//! This crate is the single source of truth for action semantics. The C
//! template handed to the WASM compiler (`vmgate-codegen`) mirrors the
//! dispatch implemented here byte for byte; the host glue (`vmgate-wasmhost`)
//! exists specifically so that `run` here and the compiled WASM's `vm_run`
//! export can be asserted equal in tests.

pub mod action;
pub mod manifest;
pub mod sbox;
pub mod vm;

pub use action::{Action, ACTION_COUNT, ACTION_NAMES};
pub use manifest::Manifest;
pub use vm::{encode, run, Operation, VmError};
