//! The VM entry points the host drives.

use prost::Message;
use wasmhost_types::ProtoActionResult;

use crate::callbacks::{Buffer, HostApi};
use crate::error::Status;

/// What a VM invocation hands back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOutput {
    pub gas_used: u64,
    pub status: Status,
    /// Encoded ActionResult describing the frame's own outcome
    pub action_result: Buffer,
}

impl VmOutput {
    pub fn new(gas_used: u64, status: Status, action_result: Buffer) -> Self {
        Self {
            gas_used,
            status,
            action_result,
        }
    }

    /// Encode the frame's own outcome the way the host expects to read it.
    pub fn report(gas_used: u64, status: Status, output: &[u8], error: &str) -> Self {
        let proto = ProtoActionResult {
            success: status.is_ok(),
            error: error.to_string(),
            gas_used,
            output_data: output.to_vec(),
            ..Default::default()
        };
        Self::new(gas_used, status, Buffer::from(proto.encode_to_vec()))
    }
}

/// A sandboxed contract VM.
///
/// Implementations must report host-side gas (the `gas_used` of every
/// callback reply) as part of their own consumption and sync their
/// remaining budget with [`HostApi::set_remaining_gas`] before each
/// callback.
pub trait Vm: Send + Sync {
    fn execute(
        &self,
        host: &mut dyn HostApi,
        code: &[u8],
        method: &str,
        args: &[u8],
        invocation_context: &[u8],
        gas_limit: u64,
    ) -> VmOutput;

    fn deploy(
        &self,
        host: &mut dyn HostApi,
        code: &[u8],
        args: &[u8],
        nonce: &[u8],
        gas_limit: u64,
    ) -> VmOutput;
}
