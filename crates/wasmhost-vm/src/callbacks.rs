//! Callback surface exposed to the VM.
//!
//! Every callback runs behind the same barrier: the gas delta is measured
//! around it, an abrupt [`HostError::OutOfGas`] or a panic is caught there,
//! and the outcome crosses back as a [`Reply`] status instead of unwinding
//! into the VM.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use wasmhost_storage::StateView;
use wasmhost_types::{unpack_arguments, Address, Amount};

use crate::config::InputLimits;
use crate::dispatcher::Session;
use crate::environment::FrameEnv;
use crate::error::{HostError, Status};
use crate::gas_metering::GasMeter;
use crate::result_tree::ResultBuilder;

/// Borrowed input buffer: absent, present but empty, or present with data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteView<'a>(Option<&'a [u8]>);

impl<'a> ByteView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(Some(bytes))
    }

    pub fn absent() -> Self {
        Self(None)
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&'a [u8]> {
        self.0
    }

    fn require(self, what: &str) -> Result<&'a [u8], HostError> {
        self.0
            .ok_or_else(|| HostError::InvalidInput(format!("missing {}", what)))
    }
}

impl<'a> From<&'a [u8]> for ByteView<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> From<Option<&'a [u8]>> for ByteView<'a> {
    fn from(bytes: Option<&'a [u8]>) -> Self {
        Self(bytes)
    }
}

/// Owned output buffer with the same three states as [`ByteView`].
/// Ownership moves to the receiver, who consumes it with [`Buffer::into_vec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer(Option<Vec<u8>>);

impl Buffer {
    pub fn absent() -> Self {
        Self(None)
    }

    pub fn empty() -> Self {
        Self(Some(Vec::new()))
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_slice(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    pub fn into_vec(self) -> Option<Vec<u8>> {
        self.0
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Some(bytes))
    }
}

impl From<Option<Vec<u8>>> for Buffer {
    fn from(bytes: Option<Vec<u8>>) -> Self {
        Self(bytes)
    }
}

/// Result of one callback.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Reply<T> {
    pub status: Status,
    /// Host gas charged by this callback; the VM must add it to its own
    pub gas_used: u64,
    pub value: T,
    /// Error text when `status` is not [`Status::Ok`]
    pub error: Buffer,
}

impl<T: Default> Reply<T> {
    pub fn ok(value: T, gas_used: u64) -> Self {
        Self {
            status: Status::Ok,
            gas_used,
            value,
            error: Buffer::absent(),
        }
    }

    pub fn failed(status: Status, gas_used: u64, message: String) -> Self {
        Self {
            status,
            gas_used,
            value: T::default(),
            error: Buffer::from(message.into_bytes()),
        }
    }
}

impl<T> Reply<T> {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn error_message(&self) -> String {
        self.error
            .as_slice()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

/// Arguments of a nested call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NestedCall<'a> {
    pub address: ByteView<'a>,
    pub method: ByteView<'a>,
    pub args: ByteView<'a>,
    pub amount: ByteView<'a>,
    pub gas_limit: u64,
    pub invocation_context: ByteView<'a>,
}

/// Arguments of a nested deploy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NestedDeploy<'a> {
    pub code: ByteView<'a>,
    pub args: ByteView<'a>,
    pub nonce: ByteView<'a>,
    pub amount: ByteView<'a>,
    pub gas_limit: u64,
}

/// Host operations available to running contract code.
///
/// Addresses are 20 raw bytes and amounts are minimal big-endian bytes.
/// An absent address in `balance` and `read_contract_data` means the
/// calling contract itself.
pub trait HostApi {
    fn set_remaining_gas(&mut self, remaining: u64) -> Reply<()>;
    fn gas_limit(&mut self) -> Reply<u64>;
    fn gas_left(&mut self) -> Reply<u64>;

    fn set_storage(&mut self, key: ByteView<'_>, value: ByteView<'_>) -> Reply<()>;
    /// Absent value when the key is not set
    fn get_storage(&mut self, key: ByteView<'_>) -> Reply<Buffer>;
    fn remove_storage(&mut self, key: ByteView<'_>) -> Reply<()>;
    fn read_contract_data(&mut self, address: ByteView<'_>, key: ByteView<'_>) -> Reply<Buffer>;

    fn balance(&mut self, address: ByteView<'_>) -> Reply<Buffer>;
    fn send(&mut self, to: ByteView<'_>, amount: ByteView<'_>) -> Reply<()>;
    fn sub_balance(&mut self, amount: ByteView<'_>) -> Reply<()>;
    fn add_balance(&mut self, to: ByteView<'_>, amount: ByteView<'_>) -> Reply<()>;
    fn burn(&mut self, amount: ByteView<'_>) -> Reply<()>;
    fn pay_amount(&mut self) -> Reply<Buffer>;

    fn block_number(&mut self) -> Reply<u64>;
    fn block_timestamp(&mut self) -> Reply<i64>;
    fn min_fee_per_gas(&mut self) -> Reply<Buffer>;
    fn block_seed(&mut self) -> Reply<Buffer>;
    fn network_size(&mut self) -> Reply<u64>;
    fn epoch(&mut self) -> Reply<u16>;

    fn identity_state(&mut self, address: ByteView<'_>) -> Reply<u8>;
    fn identity(&mut self, address: ByteView<'_>) -> Reply<Buffer>;

    fn caller(&mut self) -> Reply<Buffer>;
    fn original_caller(&mut self) -> Reply<Buffer>;
    fn contract(&mut self) -> Reply<Buffer>;
    fn own_code(&mut self) -> Reply<Buffer>;
    fn own_code_hash(&mut self) -> Reply<Buffer>;
    fn contract_code(&mut self, address: ByteView<'_>) -> Reply<Buffer>;
    fn contract_addr(
        &mut self,
        code: ByteView<'_>,
        args: ByteView<'_>,
        nonce: ByteView<'_>,
    ) -> Reply<Buffer>;

    /// `args` is a packed argument list
    fn event(&mut self, name: ByteView<'_>, args: ByteView<'_>) -> Reply<()>;
    fn debug(&mut self, message: ByteView<'_>) -> Reply<()>;

    /// Value is the child's encoded ActionResult. A failed child is
    /// reported as [`Status::ContractError`] and never aborts the caller.
    fn call(&mut self, call: NestedCall<'_>) -> Reply<Buffer>;
    fn deploy(&mut self, deploy: NestedDeploy<'_>) -> Reply<Buffer>;
}

/// What a nested call or deploy reports to the calling frame.
#[derive(Debug, Default)]
pub(crate) struct NestedOutcome {
    pub success: bool,
    pub error: String,
    pub result: Vec<u8>,
}

/// Capability handle the VM holds while one frame executes. It borrows
/// the frame's environment, meter and result builder, so it cannot outlive
/// the invocation that issued it.
pub struct FrameHandle<'a, 'p> {
    pub(crate) session: &'a mut Session,
    pub(crate) env: &'a mut FrameEnv<'p>,
    pub(crate) meter: &'a mut GasMeter,
    pub(crate) builder: &'a mut ResultBuilder,
    pub(crate) depth: usize,
    out_of_gas: bool,
}

impl<'a, 'p> FrameHandle<'a, 'p> {
    pub(crate) fn new(
        session: &'a mut Session,
        env: &'a mut FrameEnv<'p>,
        meter: &'a mut GasMeter,
        builder: &'a mut ResultBuilder,
        depth: usize,
    ) -> Self {
        Self {
            session,
            env,
            meter,
            builder,
            depth,
            out_of_gas: false,
        }
    }

    /// Whether any callback ran this frame out of gas.
    pub(crate) fn ran_out_of_gas(&self) -> bool {
        self.out_of_gas
    }

    fn limits(&self) -> InputLimits {
        self.session.config.limits
    }

    fn guarded<T: Default>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, HostError>,
    ) -> Reply<T> {
        let before = self.meter.gas_consumed();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(self)));
        let gas_used = self.meter.gas_consumed().saturating_sub(before);

        match outcome {
            Ok(Ok(value)) => Reply::ok(value, gas_used),
            Ok(Err(err)) => {
                let status = err.status();
                match status {
                    Status::OutOfGas => {
                        self.out_of_gas = true;
                        tracing::debug!(op, depth = self.depth, "Callback ran out of gas");
                    }
                    Status::HostFault => {
                        tracing::error!(op, depth = self.depth, error = %err, "Host fault in callback");
                    }
                    _ => {
                        tracing::debug!(op, depth = self.depth, error = %err, "Callback failed");
                    }
                }
                Reply::failed(status, gas_used, err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(op, depth = self.depth, panic = %message, "Callback panicked");
                Reply::failed(Status::HostFault, gas_used, format!("Host fault: {}", message))
            }
        }
    }

    fn address(view: ByteView<'_>) -> Result<Address, HostError> {
        let bytes = view.require("address")?;
        Address::from_slice(bytes)
            .map_err(|_| HostError::ContractError("invalid address".to_string()))
    }

    fn address_or_self(&self, view: ByteView<'_>) -> Result<Address, HostError> {
        if view.is_absent() {
            Ok(self.env.contract())
        } else {
            Self::address(view)
        }
    }

    fn amount(&self, view: ByteView<'_>) -> Result<Amount, HostError> {
        let bytes = view.get().unwrap_or_default();
        InputLimits::check("amount", bytes, self.limits().max_amount)?;
        Ok(Amount::from_be_slice(bytes)?)
    }

    fn text(&self, view: ByteView<'_>, what: &str) -> Result<String, HostError> {
        let bytes = view.require(what)?;
        InputLimits::check(what, bytes, self.limits().max_string)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HostError::InvalidInput(format!("{} is not valid UTF-8", what)))
    }

    fn bytes<'v>(&self, view: ByteView<'v>, what: &str, max: usize) -> Result<&'v [u8], HostError> {
        let bytes = view.get().unwrap_or_default();
        InputLimits::check(what, bytes, max)?;
        Ok(bytes)
    }
}

impl HostApi for FrameHandle<'_, '_> {
    fn set_remaining_gas(&mut self, remaining: u64) -> Reply<()> {
        self.guarded("set_remaining_gas", |frame| {
            frame.meter.set_remaining_gas(remaining);
            Ok(())
        })
    }

    fn gas_limit(&mut self) -> Reply<u64> {
        self.guarded("gas_limit", |frame| Ok(frame.meter.limit()))
    }

    fn gas_left(&mut self) -> Reply<u64> {
        self.guarded("gas_left", |frame| Ok(frame.meter.remaining()))
    }

    fn set_storage(&mut self, key: ByteView<'_>, value: ByteView<'_>) -> Reply<()> {
        self.guarded("set_storage", |frame| {
            let limits = frame.limits();
            let key = key.require("storage key")?;
            InputLimits::check("storage key", key, limits.max_storage_key)?;
            let value = frame.bytes(value, "storage value", limits.max_storage_value)?;
            frame.env.set_storage(frame.meter, key, value)
        })
    }

    fn get_storage(&mut self, key: ByteView<'_>) -> Reply<Buffer> {
        self.guarded("get_storage", |frame| {
            let key = key.require("storage key")?;
            InputLimits::check("storage key", key, frame.limits().max_storage_key)?;
            Ok(Buffer::from(frame.env.get_storage(frame.meter, key)?))
        })
    }

    fn remove_storage(&mut self, key: ByteView<'_>) -> Reply<()> {
        self.guarded("remove_storage", |frame| {
            let key = key.require("storage key")?;
            InputLimits::check("storage key", key, frame.limits().max_storage_key)?;
            frame.env.remove_storage(frame.meter, key)
        })
    }

    fn read_contract_data(&mut self, address: ByteView<'_>, key: ByteView<'_>) -> Reply<Buffer> {
        self.guarded("read_contract_data", |frame| {
            let contract = frame.address_or_self(address)?;
            let key = key.require("storage key")?;
            InputLimits::check("storage key", key, frame.limits().max_storage_key)?;
            let value = frame.env.read_contract_data(frame.meter, &contract, key)?;
            Ok(Buffer::from(value))
        })
    }

    fn balance(&mut self, address: ByteView<'_>) -> Reply<Buffer> {
        self.guarded("balance", |frame| {
            let address = frame.address_or_self(address)?;
            Ok(Buffer::from(frame.env.balance(&address).to_be_bytes()))
        })
    }

    fn send(&mut self, to: ByteView<'_>, amount: ByteView<'_>) -> Reply<()> {
        self.guarded("send", |frame| {
            let to = Self::address(to)?;
            let amount = frame.amount(amount)?;
            frame.env.send(frame.meter, &to, &amount)
        })
    }

    fn sub_balance(&mut self, amount: ByteView<'_>) -> Reply<()> {
        self.guarded("sub_balance", |frame| {
            let amount = frame.amount(amount)?;
            frame.env.sub_balance(&amount)
        })
    }

    fn add_balance(&mut self, to: ByteView<'_>, amount: ByteView<'_>) -> Reply<()> {
        self.guarded("add_balance", |frame| {
            let to = Self::address(to)?;
            let amount = frame.amount(amount)?;
            frame.env.add_balance(&to, &amount);
            Ok(())
        })
    }

    fn burn(&mut self, amount: ByteView<'_>) -> Reply<()> {
        self.guarded("burn", |frame| {
            let amount = frame.amount(amount)?;
            frame.env.burn(&amount)
        })
    }

    fn pay_amount(&mut self) -> Reply<Buffer> {
        self.guarded("pay_amount", |frame| {
            Ok(Buffer::from(frame.env.pay_amount().to_be_bytes()))
        })
    }

    fn block_number(&mut self) -> Reply<u64> {
        self.guarded("block_number", |frame| Ok(frame.env.block_number()))
    }

    fn block_timestamp(&mut self) -> Reply<i64> {
        self.guarded("block_timestamp", |frame| Ok(frame.env.block_timestamp()))
    }

    fn min_fee_per_gas(&mut self) -> Reply<Buffer> {
        self.guarded("min_fee_per_gas", |frame| {
            Ok(Buffer::from(frame.env.min_fee_per_gas().to_be_bytes()))
        })
    }

    fn block_seed(&mut self) -> Reply<Buffer> {
        self.guarded("block_seed", |frame| Ok(Buffer::from(frame.env.block_seed().to_vec())))
    }

    fn network_size(&mut self) -> Reply<u64> {
        self.guarded("network_size", |frame| Ok(frame.env.network_size()))
    }

    fn epoch(&mut self) -> Reply<u16> {
        self.guarded("epoch", |frame| Ok(frame.env.epoch()))
    }

    fn identity_state(&mut self, address: ByteView<'_>) -> Reply<u8> {
        self.guarded("identity_state", |frame| {
            let address = Self::address(address)?;
            Ok(frame.env.identity_state(&address))
        })
    }

    fn identity(&mut self, address: ByteView<'_>) -> Reply<Buffer> {
        self.guarded("identity", |frame| {
            let address = Self::address(address)?;
            Ok(Buffer::from(frame.env.identity(&address)))
        })
    }

    fn caller(&mut self) -> Reply<Buffer> {
        self.guarded("caller", |frame| Ok(Buffer::from(frame.env.caller().as_bytes().to_vec())))
    }

    fn original_caller(&mut self) -> Reply<Buffer> {
        self.guarded("original_caller", |frame| {
            Ok(Buffer::from(frame.env.original_caller().as_bytes().to_vec()))
        })
    }

    fn contract(&mut self) -> Reply<Buffer> {
        self.guarded("contract", |frame| {
            Ok(Buffer::from(frame.env.contract().as_bytes().to_vec()))
        })
    }

    fn own_code(&mut self) -> Reply<Buffer> {
        self.guarded("own_code", |frame| Ok(Buffer::from(frame.env.own_code().to_vec())))
    }

    fn own_code_hash(&mut self) -> Reply<Buffer> {
        self.guarded("own_code_hash", |frame| {
            Ok(Buffer::from(frame.env.own_code_hash().as_bytes().to_vec()))
        })
    }

    fn contract_code(&mut self, address: ByteView<'_>) -> Reply<Buffer> {
        self.guarded("contract_code", |frame| {
            let address = Self::address(address)?;
            Ok(Buffer::from(frame.env.contract_code(&address).map(|code| code.to_vec())))
        })
    }

    fn contract_addr(
        &mut self,
        code: ByteView<'_>,
        args: ByteView<'_>,
        nonce: ByteView<'_>,
    ) -> Reply<Buffer> {
        self.guarded("contract_addr", |frame| {
            let limits = frame.limits();
            let code = frame.bytes(code, "code", limits.max_code)?;
            let args = frame.bytes(args, "arguments", limits.max_args)?;
            let nonce = frame.bytes(nonce, "nonce", limits.max_string)?;
            let address = frame.env.contract_addr(code, args, nonce);
            Ok(Buffer::from(address.as_bytes().to_vec()))
        })
    }

    fn event(&mut self, name: ByteView<'_>, args: ByteView<'_>) -> Reply<()> {
        self.guarded("event", |frame| {
            let name = frame.text(name, "event name")?;
            let args = frame.bytes(args, "event arguments", frame.limits().max_args)?;
            frame.env.event(frame.meter, name, unpack_arguments(args))
        })
    }

    fn debug(&mut self, message: ByteView<'_>) -> Reply<()> {
        self.guarded("debug", |frame| {
            let message = frame.bytes(message, "debug message", frame.limits().max_string)?;
            tracing::debug!(
                target: "wasmhost::contract",
                contract = %frame.env.contract(),
                "{}",
                String::from_utf8_lossy(message)
            );
            Ok(())
        })
    }

    fn call(&mut self, call: NestedCall<'_>) -> Reply<Buffer> {
        let reply = self.guarded("call", |frame| {
            let limits = frame.limits();
            let target = Self::address(call.address)?;
            let method = frame.text(call.method, "method")?;
            let args = frame.bytes(call.args, "arguments", limits.max_args)?;
            let amount = frame.amount(call.amount)?;
            let context = frame.bytes(call.invocation_context, "invocation context", limits.max_args)?;
            frame.dispatch_call(target, &method, args, amount, call.gas_limit, context)
        });
        nested_reply(reply)
    }

    fn deploy(&mut self, deploy: NestedDeploy<'_>) -> Reply<Buffer> {
        let reply = self.guarded("deploy", |frame| {
            let limits = frame.limits();
            let code = deploy.code.require("code")?;
            InputLimits::check("code", code, limits.max_code)?;
            let args = frame.bytes(deploy.args, "arguments", limits.max_args)?;
            let nonce = frame.bytes(deploy.nonce, "nonce", limits.max_string)?;
            let amount = frame.amount(deploy.amount)?;
            frame.dispatch_deploy(code, args, nonce, amount, deploy.gas_limit)
        });
        nested_reply(reply)
    }
}

/// A failed child becomes a contract error carrying the child's result.
fn nested_reply(reply: Reply<NestedOutcome>) -> Reply<Buffer> {
    let Reply {
        status,
        gas_used,
        value,
        error,
    } = reply;
    match status {
        Status::Ok if value.success => Reply {
            status,
            gas_used,
            value: Buffer::from(value.result),
            error,
        },
        Status::Ok => Reply {
            status: Status::ContractError,
            gas_used,
            value: Buffer::from(value.result),
            error: Buffer::from(value.error.into_bytes()),
        },
        _ => Reply {
            status,
            gas_used,
            value: Buffer::absent(),
            error,
        },
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
