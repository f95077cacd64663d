//! Top-level Execute and Deploy entry points.

use bytes::Bytes;
use std::sync::Arc;
use wasmhost_storage::Ledger;
use wasmhost_types::{pack_arguments, Action, ActionResult, Address, Amount, Event};

use crate::config::{HostConfig, InputLimits};
use crate::dispatcher::{finalize, run_frame, FrameOutcome, Invocation, Session};
use crate::environment::FrameEnv;
use crate::error::{HostError, Status};
use crate::vm::Vm;
use crate::DEPLOY_METHOD;

/// A contract method invocation by an account.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub contract: Address,
    pub caller: Address,
    pub method: String,
    /// Arguments before packing
    pub args: Vec<Vec<u8>>,
    pub amount: Amount,
    pub gas_limit: u64,
    /// Code to run instead of the code stored at `contract`
    pub code: Option<Bytes>,
    pub invocation_context: Vec<u8>,
}

impl ExecuteRequest {
    pub fn new(contract: Address, caller: Address, method: impl Into<String>, gas_limit: u64) -> Self {
        Self {
            contract,
            caller,
            method: method.into(),
            args: Vec::new(),
            amount: Amount::zero(),
            gas_limit,
            code: None,
            invocation_context: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Vec<u8>>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<Vec<u8>>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_invocation_context(mut self, context: Vec<u8>) -> Self {
        self.invocation_context = context;
        self
    }
}

/// Deployment of new contract code by an account.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub caller: Address,
    pub code: Bytes,
    pub args: Vec<Vec<u8>>,
    pub nonce: Vec<u8>,
    pub amount: Amount,
    pub gas_limit: u64,
}

impl DeployRequest {
    pub fn new(caller: Address, code: impl Into<Bytes>, gas_limit: u64) -> Self {
        Self {
            caller,
            code: code.into(),
            args: Vec::new(),
            nonce: Vec::new(),
            amount: Amount::zero(),
            gas_limit,
        }
    }

    pub fn with_args(mut self, args: Vec<Vec<u8>>) -> Self {
        self.args = args;
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<Vec<u8>>) -> Self {
        self.nonce = nonce.into();
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    /// Address the contract will be deployed at.
    pub fn address(&self) -> Address {
        Address::derive_contract(&self.code, &pack_arguments(&self.args), &self.nonce)
    }
}

/// What the original caller gets back.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Total gas used by the whole call tree
    pub gas_used: u64,
    pub status: Status,
    pub success: bool,
    pub error: String,
    /// Root of the ActionResult tree, arguments already truncated
    pub result: ActionResult,
    pub result_bytes: Vec<u8>,
    /// Events applied to the ledger, empty unless the root succeeded
    pub events: Vec<Event>,
    /// Address of the new contract after a successful deploy
    pub deployed: Option<Address>,
}

impl ExecutionOutcome {
    fn new(result: ActionResult, status: Status, events: Vec<Event>, deployed: Option<Address>) -> Self {
        Self {
            gas_used: result.gas_used,
            status,
            success: result.success,
            error: result.error.clone(),
            result_bytes: result.to_bytes(),
            result,
            events,
            deployed,
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.result.output_data
    }
}

/// Host side of the contract VM: runs call trees against a ledger.
///
/// Each call to [`WasmHost::execute`] or [`WasmHost::deploy`] builds its own
/// session, so one host may serve any number of independent call trees.
pub struct WasmHost {
    vm: Arc<dyn Vm>,
    config: Arc<HostConfig>,
}

impl WasmHost {
    /// Build a host, rejecting configurations that `HostConfig::validate`
    /// refuses.
    pub fn new(vm: Arc<dyn Vm>, config: HostConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            vm,
            config: Arc::new(config),
        })
    }

    pub fn with_default_config(vm: Arc<dyn Vm>) -> Self {
        Self {
            vm,
            config: Arc::new(HostConfig::default()),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn execute(
        &self,
        ledger: &dyn Ledger,
        request: ExecuteRequest,
    ) -> Result<ExecutionOutcome, HostError> {
        let limits = self.config.limits;
        let args = pack_arguments(&request.args);
        InputLimits::check("method", request.method.as_bytes(), limits.max_string)?;
        InputLimits::check("arguments", &args, limits.max_args)?;
        InputLimits::check("invocation context", &request.invocation_context, limits.max_args)?;
        InputLimits::check("amount", &request.amount.to_be_bytes(), limits.max_amount)?;

        let action = Action::call(
            request.method.as_str(),
            args.clone(),
            request.amount.clone(),
            request.gas_limit,
        );
        let code = match request.code.clone().or_else(|| ledger.code(&request.contract)) {
            Some(code) if !code.is_empty() => code,
            _ => return Ok(self.rejected(action, "no code at address")),
        };
        if request.method == DEPLOY_METHOD {
            return Ok(self.rejected(action, "direct call to deploy is forbidden"));
        }

        let mut env = FrameEnv::root(
            ledger,
            self.config.gas,
            request.contract,
            request.caller,
            code,
        );
        if let Err(e) = env.transfer_in(&request.caller, &request.amount) {
            return Ok(self.rejected(action, &e.to_string()));
        }

        let mut session = Session::new(Arc::clone(&self.vm), Arc::clone(&self.config));
        let outcome = run_frame(
            &mut session,
            env,
            action,
            Invocation::Call {
                method: &request.method,
                args: &args,
                context: &request.invocation_context,
            },
        );
        self.finish(ledger, outcome, None)
    }

    pub fn deploy(
        &self,
        ledger: &dyn Ledger,
        request: DeployRequest,
    ) -> Result<ExecutionOutcome, HostError> {
        let limits = self.config.limits;
        let args = pack_arguments(&request.args);
        if request.code.is_empty() {
            return Err(HostError::InvalidInput("code is empty".to_string()));
        }
        InputLimits::check("code", &request.code, limits.max_code)?;
        InputLimits::check("arguments", &args, limits.max_args)?;
        InputLimits::check("nonce", &request.nonce, limits.max_string)?;
        InputLimits::check("amount", &request.amount.to_be_bytes(), limits.max_amount)?;

        let action = Action::deploy(args.clone(), request.amount.clone(), request.gas_limit);
        let address = Address::derive_contract(&request.code, &args, &request.nonce);
        if ledger.code(&address).is_some() {
            return Ok(self.rejected(action, "contract already exists"));
        }

        let mut env = FrameEnv::root(
            ledger,
            self.config.gas,
            address,
            request.caller,
            request.code.clone(),
        );
        if let Err(e) = env.transfer_in(&request.caller, &request.amount) {
            return Ok(self.rejected(action, &e.to_string()));
        }
        env.install_code(request.code.clone());

        let mut session = Session::new(Arc::clone(&self.vm), Arc::clone(&self.config));
        let outcome = run_frame(
            &mut session,
            env,
            action,
            Invocation::Deploy {
                args: &args,
                nonce: &request.nonce,
            },
        );
        self.finish(ledger, outcome, Some(address))
    }

    /// The root frame could not be started; the whole budget is forfeit.
    fn rejected(&self, action: Action, reason: &str) -> ExecutionOutcome {
        tracing::warn!(method = %action.method, gas_limit = action.gas_limit, reason, "Rejected invocation");
        let gas_limit = action.gas_limit;
        let mut result = ActionResult::failed(action, reason, gas_limit);
        result.truncate_args(self.config.max_args_length);
        ExecutionOutcome::new(result, Status::ContractError, Vec::new(), None)
    }

    fn finish(
        &self,
        ledger: &dyn Ledger,
        outcome: FrameOutcome<'_>,
        deployed: Option<Address>,
    ) -> Result<ExecutionOutcome, HostError> {
        let FrameOutcome { env, result, status } = outcome;
        let contract = env.contract();
        let events = match finalize(env, result.success) {
            Some(changes) => {
                let events = changes.events().to_vec();
                ledger.apply(changes)?;
                events
            }
            None => Vec::new(),
        };

        tracing::info!(
            contract = %contract,
            gas_used = result.gas_used,
            success = result.success,
            calls = result.node_count() - 1,
            events = events.len(),
            "Execution finished"
        );

        let deployed = deployed.filter(|_| result.success);
        Ok(ExecutionOutcome::new(result, status, events, deployed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptVm;
    use wasmhost_storage::{MemoryLedger, StateView};

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn test_new_validates_config() {
        let vm: Arc<dyn Vm> = Arc::new(ScriptVm::new());
        assert!(WasmHost::new(Arc::clone(&vm), HostConfig::default()).is_ok());

        let mut config = HostConfig::default();
        config.max_args_length = 0;
        assert!(WasmHost::new(Arc::clone(&vm), config).is_err());

        let mut config = HostConfig::default();
        config.max_call_depth = 0;
        assert!(WasmHost::new(vm, config).is_err());
    }

    #[test]
    fn test_root_refused_by_call_stack_forfeits_budget() {
        let mut config = HostConfig::default();
        config.max_call_depth = 0;
        let host = WasmHost {
            vm: Arc::new(ScriptVm::new()),
            config: Arc::new(config),
        };
        let ledger = MemoryLedger::default().with_code(addr(1), "fn run\n store k v\n return ok");

        let request = ExecuteRequest::new(addr(1), addr(0xaa), "run", 700)
            .with_arg(vec![7u8; 300]);
        let outcome = host.execute(&ledger, request).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.status, Status::ContractError);
        assert_eq!(outcome.gas_used, 700);
        assert_eq!(outcome.error, "Call depth exceeded: 0");
        assert!(outcome.result.input_action.args.len() <= 100);
        assert!(outcome.result.sub_action_results.is_empty());
        assert_eq!(ledger.storage(&addr(1), b"k"), None);
    }
}
