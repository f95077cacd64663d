//! Wasmhost VM - host side of the contract VM boundary.
//!
//! This crate provides:
//! - Per-frame gas metering
//! - The frame environment over a ledger overlay
//! - The callback surface a VM uses to reach the host
//! - Nested call/deploy dispatch with commit and revert
//! - ActionResult tree assembly and argument truncation
//! - Top-level Execute/Deploy entry points

pub mod call_stack;
pub mod callbacks;
pub mod config;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod gas_metering;
pub mod result_tree;
pub mod runtime;
pub mod telemetry;
pub mod testing;
pub mod vm;

pub use call_stack::{CallFrame, CallStack};
pub use callbacks::{Buffer, ByteView, FrameHandle, HostApi, NestedCall, NestedDeploy, Reply};
pub use config::{HostConfig, InputLimits, LoggingConfig};
pub use dispatcher::{FrameOutcome, Invocation, Session};
pub use environment::FrameEnv;
pub use error::{HostError, Status};
pub use gas_metering::{GasMeter, GasSchedule};
pub use result_tree::{FrameSummary, ResultBuilder, VmReport};
pub use runtime::{DeployRequest, ExecuteRequest, ExecutionOutcome, WasmHost};
pub use telemetry::init_telemetry;
pub use vm::{Vm, VmOutput};

/// Maximum call depth, root frame included
pub const MAX_CALL_DEPTH: usize = 64;

/// Argument bytes kept per ActionResult node
pub const DEFAULT_MAX_ARGS_LENGTH: usize = 100;

/// Method name reserved for constructors; never callable directly
pub const DEPLOY_METHOD: &str = "deploy";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_CALL_DEPTH, 64);
        assert_eq!(DEFAULT_MAX_ARGS_LENGTH, 100);
        assert_eq!(HostConfig::default().max_call_depth, MAX_CALL_DEPTH);
    }
}
