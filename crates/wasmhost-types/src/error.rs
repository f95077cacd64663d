use thiserror::Error;

/// Errors that can occur in type operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("Invalid address length: expected 20, got {0}")]
    InvalidAddressLength(usize),

    #[error("Invalid hash length: expected 32, got {0}")]
    InvalidHashLength(usize),

    #[error("Amount too large: max {max} bytes, got {actual}")]
    AmountTooLarge { max: usize, actual: usize },

    #[error("Invalid amount string: {0}")]
    InvalidAmountString(String),

    #[error("Amount underflow")]
    AmountUnderflow,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Bech32 error: {0}")]
    Bech32Error(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(u32),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

impl From<prost::DecodeError> for TypesError {
    fn from(e: prost::DecodeError) -> Self {
        TypesError::Decode(e.to_string())
    }
}
