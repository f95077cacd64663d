//! Interface to the external ledger store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use wasmhost_types::{Address, Amount};

use crate::changeset::ChangeSet;
use crate::error::StorageError;

/// Chain metadata visible to contracts for the duration of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub block_number: u64,
    /// Unix timestamp in seconds
    pub block_timestamp: i64,
    pub min_fee_per_gas: Amount,
    pub block_seed: Vec<u8>,
    pub network_size: u64,
    pub epoch: u16,
}

impl Default for ChainInfo {
    fn default() -> Self {
        Self {
            block_number: 1,
            block_timestamp: 0,
            min_fee_per_gas: Amount::zero(),
            block_seed: vec![0u8; 32],
            network_size: 0,
            epoch: 0,
        }
    }
}

/// Read access to contract state.
///
/// Implemented by the ledger itself and by every frame overlay stacked on
/// top of it.
pub trait StateView {
    fn storage(&self, contract: &Address, key: &[u8]) -> Option<Vec<u8>>;

    fn balance(&self, address: &Address) -> Amount;

    fn code(&self, address: &Address) -> Option<Bytes>;
}

/// The persistent ledger a root frame executes against.
pub trait Ledger: StateView + Send + Sync {
    fn chain_info(&self) -> ChainInfo;

    fn identity_state(&self, address: &Address) -> u8;

    /// Encoded identity record, if the address has one.
    fn identity(&self, address: &Address) -> Option<Vec<u8>>;

    /// Atomically apply a committed root overlay.
    fn apply(&self, changes: ChangeSet) -> Result<(), StorageError>;
}
