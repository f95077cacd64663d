//! Wasmhost Types - Core type definitions shared by the host and the VM.
//!
//! This crate provides:
//! - Addresses (20-byte, Bech32m encoded) and contract address derivation
//! - Hashes (32-byte, blake3 digests)
//! - Arbitrary-precision token amounts
//! - Action descriptors and the recursive ActionResult record
//! - Protobuf wire messages and the argument codec

pub mod action;
pub mod address;
pub mod amount;
pub mod args;
pub mod error;
pub mod event;
pub mod hash;
pub mod wire;

mod serialization;

pub use action::{Action, ActionResult, ActionType};
pub use address::Address;
pub use amount::Amount;
pub use args::{decode_arguments, pack_arguments, pack_plain, unpack_arguments, ArgsFormat};
pub use error::TypesError;
pub use event::Event;
pub use hash::Hash;
pub use wire::{ProtoAction, ProtoActionResult, ProtoArgs};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        pack_arguments, unpack_arguments, Action, ActionResult, ActionType, Address, Amount,
        Event, Hash, TypesError,
    };
}
