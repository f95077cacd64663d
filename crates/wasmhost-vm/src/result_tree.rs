//! Per-frame ActionResult assembly.

use prost::Message;
use wasmhost_types::{Action, ActionResult, Amount, ProtoActionResult};

use crate::callbacks::Buffer;
use crate::error::Status;

/// Collects one frame's sub-call results, in call order, until the frame
/// finishes.
#[derive(Debug)]
pub struct ResultBuilder {
    action: Action,
    children: Vec<ActionResult>,
}

/// Final figures of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub success: bool,
    pub error: String,
    pub gas_used: u64,
    pub output_data: Vec<u8>,
    pub remaining_gas_cost: Amount,
}

impl ResultBuilder {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            children: Vec::new(),
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn push_child(&mut self, child: ActionResult) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[ActionResult] {
        &self.children
    }

    pub fn finish(self, summary: FrameSummary) -> ActionResult {
        ActionResult {
            input_action: self.action,
            success: summary.success,
            error: summary.error,
            gas_used: summary.gas_used,
            output_data: summary.output_data,
            remaining_gas_cost: summary.remaining_gas_cost,
            sub_action_results: self.children,
        }
    }
}

/// The part of a VM's reported result the host keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmReport {
    pub success: bool,
    pub error: String,
    pub output_data: Vec<u8>,
}

impl VmReport {
    /// Interpret the VM's status and result bytes. Undecodable bytes fail
    /// the frame and are kept verbatim as its output for diagnostics.
    pub fn decode(status: Status, action_result: Buffer) -> Self {
        let raw = action_result.into_vec().unwrap_or_default();
        if raw.is_empty() {
            return Self {
                success: status.is_ok(),
                error: status_text(status).to_string(),
                output_data: Vec::new(),
            };
        }

        match ProtoActionResult::decode(raw.as_slice()) {
            Ok(proto) => {
                let success = status.is_ok() && proto.success;
                let error = if success || !proto.error.is_empty() {
                    proto.error
                } else if status.is_ok() {
                    status_text(Status::ContractError).to_string()
                } else {
                    status_text(status).to_string()
                };
                Self {
                    success,
                    error,
                    output_data: proto.output_data,
                }
            }
            Err(e) => {
                tracing::warn!(len = raw.len(), error = %e, "Malformed action result from VM");
                Self {
                    success: false,
                    error: format!("malformed action result: {}", e),
                    output_data: raw,
                }
            }
        }
    }
}

fn status_text(status: Status) -> &'static str {
    match status {
        Status::Ok => "",
        Status::ContractError => "contract error",
        Status::OutOfGas => "out of gas",
        Status::HostFault => "host fault",
    }
}
