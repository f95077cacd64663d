//! Wasmhost Storage - Ledger interface and frame overlays.
//!
//! The host never writes to the ledger directly. Every frame accumulates
//! its writes in a [`ChangeSet`]; committed child overlays fold into their
//! parent and only the root overlay reaches [`Ledger::apply`].

pub mod changeset;
pub mod error;
pub mod ledger;
pub mod memory;

pub use changeset::ChangeSet;
pub use error::StorageError;
pub use ledger::{ChainInfo, Ledger, StateView};
pub use memory::{Account, MemoryLedger};
