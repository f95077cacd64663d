use thiserror::Error;
use wasmhost_storage::StorageError;
use wasmhost_types::{Amount, TypesError};

/// Outcome class reported across the VM boundary, both by callbacks and by
/// the VM entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    /// Recoverable contract-level failure
    ContractError = 1,
    OutOfGas = 2,
    /// Internal fault on the host side of the boundary
    HostFault = 3,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Errors raised by host operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// Abrupt exit: propagates with `?` to the nearest callback or frame
    /// barrier, which reports the whole frame budget as used.
    #[error("Out of gas: used {used}, limit {limit}")]
    OutOfGas { used: u64, limit: u64 },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("{0}")]
    ContractError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Call depth exceeded: {depth}")]
    CallDepthExceeded { depth: usize },

    #[error("Reentrancy violation: {0}")]
    ReentrancyViolation(String),

    #[error("Host fault: {0}")]
    HostFault(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl HostError {
    pub fn status(&self) -> Status {
        match self {
            HostError::OutOfGas { .. } => Status::OutOfGas,
            HostError::HostFault(_) | HostError::Storage(_) => Status::HostFault,
            _ => Status::ContractError,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, HostError::OutOfGas { .. })
    }
}

impl From<TypesError> for HostError {
    fn from(e: TypesError) -> Self {
        HostError::InvalidInput(e.to_string())
    }
}
