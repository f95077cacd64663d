//! Nested call and deploy orchestration.
//!
//! Each frame runs behind a barrier in [`run_frame`]: an out-of-gas exit or
//! a panic inside the VM is converted there into a failed ActionResult, so
//! the caller's VM invocation keeps running. The dispatching frame then
//! commits the child's overlay into its own or discards it, and charges the
//! child's gas to its own meter either way.

use bytes::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use wasmhost_storage::ChangeSet;
use wasmhost_types::{Action, ActionResult, Address, Amount};

use crate::call_stack::CallStack;
use crate::callbacks::{panic_message, FrameHandle, NestedOutcome};
use crate::config::HostConfig;
use crate::environment::FrameEnv;
use crate::error::{HostError, Status};
use crate::gas_metering::GasMeter;
use crate::result_tree::{FrameSummary, ResultBuilder, VmReport};
use crate::vm::{Vm, VmOutput};
use crate::DEPLOY_METHOD;

/// State shared by every frame of one call tree.
pub struct Session {
    pub(crate) vm: Arc<dyn Vm>,
    pub(crate) config: Arc<HostConfig>,
    pub(crate) stack: CallStack,
}

impl Session {
    pub fn new(vm: Arc<dyn Vm>, config: Arc<HostConfig>) -> Self {
        let stack = CallStack::new(config.max_call_depth, config.allow_reentrancy);
        Self { vm, config, stack }
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }
}

/// Which VM entry point a frame runs.
#[derive(Debug, Clone, Copy)]
pub enum Invocation<'i> {
    Call {
        method: &'i str,
        args: &'i [u8],
        context: &'i [u8],
    },
    Deploy {
        args: &'i [u8],
        nonce: &'i [u8],
    },
}

/// A finished frame. The environment still holds the frame's overlay; the
/// creator decides whether to commit or clear it.
pub struct FrameOutcome<'p> {
    pub env: FrameEnv<'p>,
    pub result: ActionResult,
    pub status: Status,
}

/// Run one frame to completion. Never fails: every failure mode ends up in
/// the returned ActionResult.
pub(crate) fn run_frame<'p>(
    session: &mut Session,
    mut env: FrameEnv<'p>,
    action: Action,
    invocation: Invocation<'_>,
) -> FrameOutcome<'p> {
    let gas_limit = action.gas_limit;
    let mark = session.stack.depth();
    let depth = match session
        .stack
        .enter(env.contract(), env.caller(), action.amount.clone())
    {
        Ok(depth) => depth,
        Err(e) => {
            tracing::warn!(contract = %env.contract(), error = %e, "Frame refused by call stack");
            let mut result = ActionResult::failed(action, e.to_string(), gas_limit);
            result.truncate_args(session.config.max_args_length);
            return FrameOutcome {
                env,
                result,
                status: e.status(),
            };
        }
    };

    let mut meter = GasMeter::new(gas_limit);
    let mut builder = ResultBuilder::new(action);
    let vm = Arc::clone(&session.vm);
    let code = env.own_code().clone();

    let run = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut handle =
            FrameHandle::new(&mut *session, &mut env, &mut meter, &mut builder, depth);
        let output = match invocation {
            Invocation::Call {
                method,
                args,
                context,
            } => vm.execute(&mut handle, &code, method, args, context, gas_limit),
            Invocation::Deploy { args, nonce } => {
                vm.deploy(&mut handle, &code, args, nonce, gas_limit)
            }
        };
        (output, handle.ran_out_of_gas())
    }));
    session.stack.unwind_to(mark);

    let (output, callback_out_of_gas) = match run {
        Ok(run) => run,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(contract = %env.contract(), depth, panic = %message, "VM panicked");
            let error = format!("Host fault: {}", message);
            (VmOutput::report(gas_limit, Status::HostFault, b"", &error), false)
        }
    };

    let reported = output.gas_used.max(meter.gas_consumed());
    let out_of_gas =
        output.status == Status::OutOfGas || callback_out_of_gas || reported > gas_limit;
    let (status, gas_used) = if out_of_gas {
        (Status::OutOfGas, gas_limit)
    } else {
        (output.status, reported)
    };

    let report = VmReport::decode(status, output.action_result);
    let status = match (report.success, status) {
        (true, _) => Status::Ok,
        (false, Status::Ok) => Status::ContractError,
        (false, status) => status,
    };

    let remaining_gas_cost = env.min_fee_per_gas() * gas_limit.saturating_sub(gas_used);
    let mut result = builder.finish(FrameSummary {
        success: report.success,
        error: report.error,
        gas_used,
        output_data: report.output_data,
        remaining_gas_cost,
    });
    result.truncate_args(session.config.max_args_length);

    tracing::debug!(
        contract = %env.contract(),
        depth,
        gas_used,
        ?status,
        children = result.sub_action_results.len(),
        "Frame finished"
    );

    FrameOutcome {
        env,
        result,
        status,
    }
}

impl FrameHandle<'_, '_> {
    pub(crate) fn dispatch_call(
        &mut self,
        target: Address,
        method: &str,
        args: &[u8],
        amount: Amount,
        gas_limit: u64,
        context: &[u8],
    ) -> Result<NestedOutcome, HostError> {
        let child_gas = gas_limit.min(self.meter.remaining());
        let action = Action::call(method, args.to_vec(), amount.clone(), child_gas);

        let code = match self.env.contract_code(&target) {
            Some(code) if !code.is_empty() => code,
            _ => return self.reject(action, "no code at address".to_string()),
        };
        if method == DEPLOY_METHOD {
            let reason = "direct call to deploy is forbidden".to_string();
            return self.reject(action, reason);
        }
        if let Err(e) = self.precheck(&target, &amount) {
            return self.reject(action, e.to_string());
        }

        let child = self.env.derive_call(target, code, amount)?;
        let FrameOutcome { env: child, result, .. } = run_frame(
            self.session,
            child,
            action,
            Invocation::Call {
                method,
                args,
                context,
            },
        );
        if let Some(changes) = finalize(child, result.success) {
            self.env.absorb(changes);
        }
        self.record_child(result)
    }

    pub(crate) fn dispatch_deploy(
        &mut self,
        code: &[u8],
        args: &[u8],
        nonce: &[u8],
        amount: Amount,
        gas_limit: u64,
    ) -> Result<NestedOutcome, HostError> {
        let child_gas = gas_limit.min(self.meter.remaining());
        let action = Action::deploy(args.to_vec(), amount.clone(), child_gas);
        let address = self.env.contract_addr(code, args, nonce);

        if self.env.contract_code(&address).is_some() {
            return self.reject(action, "contract already exists".to_string());
        }
        if let Err(e) = self.precheck(&address, &amount) {
            return self.reject(action, e.to_string());
        }

        let child = self
            .env
            .derive_deploy(address, Bytes::copy_from_slice(code), amount)?;
        tracing::debug!(contract = %address, depth = self.depth + 1, "Deploying nested contract");
        let FrameOutcome { env: child, result, .. } =
            run_frame(self.session, child, action, Invocation::Deploy { args, nonce });
        if let Some(changes) = finalize(child, result.success) {
            self.env.absorb(changes);
        }
        self.record_child(result)
    }

    /// Everything that must hold before a child frame is created.
    fn precheck(&self, target: &Address, amount: &Amount) -> Result<(), HostError> {
        self.session.stack.check_enter(target)?;
        self.env.check_funds(amount)
    }

    /// Invalid targets forfeit the whole gas limit granted to the child and
    /// still leave a failed child node behind.
    fn reject(&mut self, action: Action, reason: String) -> Result<NestedOutcome, HostError> {
        let penalty = action.gas_limit;
        tracing::warn!(
            contract = %self.env.contract(),
            depth = self.depth,
            penalty,
            reason = %reason,
            "Rejected nested invocation"
        );
        let mut result = ActionResult::failed(action, reason, penalty);
        result.truncate_args(self.session.config.max_args_length);
        self.record_child(result)
    }

    /// Attach a child's result in call order and charge its gas here,
    /// whether or not the child succeeded.
    fn record_child(&mut self, result: ActionResult) -> Result<NestedOutcome, HostError> {
        let outcome = NestedOutcome {
            success: result.success,
            error: result.error.clone(),
            result: result.to_bytes(),
        };
        let gas_used = result.gas_used;
        self.builder.push_child(result);
        self.meter.consume_gas(gas_used)?;
        Ok(outcome)
    }
}

/// Commit a successful frame's overlay for its creator, discard a failed one.
pub(crate) fn finalize(env: FrameEnv<'_>, success: bool) -> Option<ChangeSet> {
    if success {
        Some(env.commit())
    } else {
        env.clear();
        None
    }
}
