//! Argument codec.
//!
//! A packed argument buffer carries one leading format tag:
//! - `0x00` plain: the remaining bytes are a single raw argument
//! - `0x01` structured: the remaining bytes are a [`ProtoArgs`] message
//!
//! [`pack_arguments`] always emits the structured form. [`unpack_arguments`]
//! never fails: empty, malformed or unknown input yields an empty list.

use crate::error::TypesError;
use crate::wire::ProtoArgs;
use prost::Message;

/// Leading format tag of a packed argument buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgsFormat {
    Plain = 0x00,
    Structured = 0x01,
}

impl TryFrom<u8> for ArgsFormat {
    type Error = TypesError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x00 => Ok(Self::Plain),
            0x01 => Ok(Self::Structured),
            other => Err(TypesError::InvalidArguments(format!(
                "unknown format tag 0x{:02x}",
                other
            ))),
        }
    }
}

/// Pack an ordered argument list in the structured format.
pub fn pack_arguments<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let proto = ProtoArgs {
        args: args.iter().map(|arg| arg.as_ref().to_vec()).collect(),
    };
    let mut out = Vec::with_capacity(1 + proto.encoded_len());
    out.push(ArgsFormat::Structured as u8);
    out.extend_from_slice(&proto.encode_to_vec());
    out
}

/// Pack a single raw argument in the plain format.
pub fn pack_plain(arg: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + arg.len());
    out.push(ArgsFormat::Plain as u8);
    out.extend_from_slice(arg);
    out
}

/// Strict decoding; reports why a buffer is not a valid argument list.
pub fn decode_arguments(bytes: &[u8]) -> Result<Vec<Vec<u8>>, TypesError> {
    let Some((&tag, payload)) = bytes.split_first() else {
        return Ok(Vec::new());
    };
    match ArgsFormat::try_from(tag)? {
        ArgsFormat::Plain => Ok(vec![payload.to_vec()]),
        ArgsFormat::Structured => ProtoArgs::decode(payload)
            .map(|proto| proto.args)
            .map_err(|e| TypesError::InvalidArguments(e.to_string())),
    }
}

/// Lenient decoding used at every trust boundary.
pub fn unpack_arguments(bytes: &[u8]) -> Vec<Vec<u8>> {
    decode_arguments(bytes).unwrap_or_default()
}
