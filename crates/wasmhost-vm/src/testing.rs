//! A small deterministic script VM for tests and local tooling.
//!
//! Contract code is UTF-8 text made of `fn <method>` sections, one
//! instruction per line, `#` starting a comment:
//!
//! ```text
//! fn transfer
//!     call! $0 credit 5000 value=$1 $1
//!     return done
//! ```
//!
//! Operands are `$last` (result of the previous instruction), `$N`
//! (the N-th call argument), `0x`-prefixed hex, `_` for the empty string,
//! or literal text. Amount operands additionally accept decimal numbers and
//! address operands accept `wh1...` strings.
//!
//! Every instruction costs [`ScriptVm::instruction_cost`] gas. Before each
//! callback the interpreter syncs its remaining budget to the host and adds
//! the host's charge to its own consumption.

use std::str::FromStr;
use wasmhost_types::{pack_arguments, unpack_arguments, ActionResult, Address, Amount};

use crate::callbacks::{Buffer, ByteView, HostApi, NestedCall, NestedDeploy, Reply};
use crate::error::Status;
use crate::vm::{Vm, VmOutput};

/// Method run by [`Vm::deploy`], when the script defines it.
const CONSTRUCTOR: &str = "deploy";

#[derive(Debug, Clone)]
pub struct ScriptVm {
    instruction_cost: u64,
}

impl ScriptVm {
    pub fn new() -> Self {
        Self {
            instruction_cost: 1,
        }
    }

    pub fn with_instruction_cost(mut self, cost: u64) -> Self {
        self.instruction_cost = cost;
        self
    }

    pub fn instruction_cost(&self) -> u64 {
        self.instruction_cost
    }

    fn run(
        &self,
        host: &mut dyn HostApi,
        code: &[u8],
        method: &str,
        args: &[u8],
        gas_limit: u64,
        required: bool,
    ) -> VmOutput {
        let mut interpreter = Interpreter {
            host,
            args: unpack_arguments(args),
            cost: self.instruction_cost,
            gas_limit,
            used: 0,
            last: Vec::new(),
        };

        let halt = match std::str::from_utf8(code) {
            Err(_) => Halt::Fail("code is not a valid script".to_string()),
            Ok(source) => match (function(source, method), required) {
                (Some(body), _) => interpreter.run(&body),
                (None, true) => Halt::Fail(format!("unknown method {}", method)),
                (None, false) => Halt::Return(Vec::new()),
            },
        };

        let used = interpreter.used.min(gas_limit);
        match halt {
            Halt::Return(output) => VmOutput::report(used, Status::Ok, &output, ""),
            Halt::Fail(error) => VmOutput::report(used, Status::ContractError, b"", &error),
            Halt::OutOfGas => VmOutput::report(gas_limit, Status::OutOfGas, b"", "out of gas"),
            Halt::Fault(error) => VmOutput::report(used, Status::HostFault, b"", &error),
        }
    }
}

impl Default for ScriptVm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm for ScriptVm {
    fn execute(
        &self,
        host: &mut dyn HostApi,
        code: &[u8],
        method: &str,
        args: &[u8],
        _invocation_context: &[u8],
        gas_limit: u64,
    ) -> VmOutput {
        self.run(host, code, method, args, gas_limit, true)
    }

    fn deploy(
        &self,
        host: &mut dyn HostApi,
        code: &[u8],
        args: &[u8],
        _nonce: &[u8],
        gas_limit: u64,
    ) -> VmOutput {
        self.run(host, code, CONSTRUCTOR, args, gas_limit, false)
    }
}

/// Body of `fn <name>`, comments and blank lines removed.
fn function<'s>(source: &'s str, name: &str) -> Option<Vec<&'s str>> {
    let mut body = None;
    for line in source.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix("fn ") {
            if body.is_some() {
                break;
            }
            if header.trim() == name {
                body = Some(Vec::new());
            }
            continue;
        }
        if let Some(lines) = body.as_mut() {
            lines.push(line);
        }
    }
    body
}

enum Halt {
    Return(Vec<u8>),
    Fail(String),
    OutOfGas,
    Fault(String),
}

struct Interpreter<'h> {
    host: &'h mut dyn HostApi,
    args: Vec<Vec<u8>>,
    cost: u64,
    gas_limit: u64,
    used: u64,
    last: Vec<u8>,
}

impl Interpreter<'_> {
    fn run(&mut self, body: &[&str]) -> Halt {
        for line in body {
            if let Err(halt) = self.step(line) {
                return halt;
            }
        }
        Halt::Return(Vec::new())
    }

    fn charge(&mut self, gas: u64) -> Result<(), Halt> {
        self.used = self.used.saturating_add(gas);
        if self.used > self.gas_limit {
            return Err(Halt::OutOfGas);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), Halt> {
        let reply = self.host.set_remaining_gas(self.gas_limit.saturating_sub(self.used));
        self.absorb(reply)
    }

    fn absorb<T>(&mut self, reply: Reply<T>) -> Result<T, Halt> {
        self.charge(reply.gas_used)?;
        match reply.status {
            Status::Ok => Ok(reply.value),
            Status::OutOfGas => Err(Halt::OutOfGas),
            Status::ContractError => Err(Halt::Fail(reply.error_message())),
            Status::HostFault => Err(Halt::Fault(reply.error_message())),
        }
    }

    fn step(&mut self, line: &str) -> Result<(), Halt> {
        self.charge(self.cost)?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (op, rest) = match tokens.split_first() {
            Some((op, rest)) => (*op, rest),
            None => return Ok(()),
        };

        match (op, rest) {
            ("store", [key, value]) => {
                let (key, value) = (self.operand(key)?, self.operand(value)?);
                self.sync()?;
                let reply = self.host.set_storage(ByteView::new(&key), ByteView::new(&value));
                self.absorb(reply)
            }
            ("load", [key]) => {
                let key = self.operand(key)?;
                self.sync()?;
                let reply = self.host.get_storage(ByteView::new(&key));
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("remove", [key]) => {
                let key = self.operand(key)?;
                self.sync()?;
                let reply = self.host.remove_storage(ByteView::new(&key));
                self.absorb(reply)
            }
            ("read", [address, key]) => {
                let (address, key) = (self.address(address)?, self.operand(key)?);
                self.sync()?;
                let reply = self
                    .host
                    .read_contract_data(ByteView::new(&address), ByteView::new(&key));
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("balance", []) | ("balance", [_]) => {
                let address = match rest.first() {
                    Some(token) => Some(self.address(token)?),
                    None => None,
                };
                self.sync()?;
                let reply = self.host.balance(ByteView::from(address.as_deref()));
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("send", [to, amount]) => {
                let (to, amount) = (self.address(to)?, self.amount(amount)?);
                self.sync()?;
                let reply = self.host.send(ByteView::new(&to), ByteView::new(&amount));
                self.absorb(reply)
            }
            ("burn", [amount]) => {
                let amount = self.amount(amount)?;
                self.sync()?;
                let reply = self.host.burn(ByteView::new(&amount));
                self.absorb(reply)
            }
            ("emit", [name, args @ ..]) => {
                let args = self.operands(args)?;
                let packed = pack_arguments(&args);
                self.sync()?;
                let reply = self
                    .host
                    .event(ByteView::new(name.as_bytes()), ByteView::new(&packed));
                self.absorb(reply)
            }
            ("debug", words) => {
                let message = words.join(" ");
                self.sync()?;
                let reply = self.host.debug(ByteView::new(message.as_bytes()));
                self.absorb(reply)
            }
            ("call", [address, method, gas, args @ ..]) => self.call(address, method, gas, args, false),
            ("call!", [address, method, gas, args @ ..]) => self.call(address, method, gas, args, true),
            ("deploy", [nonce, gas, args @ ..]) => self.deploy(nonce, gas, args),
            ("identity_state", [address]) => {
                let address = self.address(address)?;
                self.sync()?;
                let reply = self.host.identity_state(ByteView::new(&address));
                self.last = vec![self.absorb(reply)?];
                Ok(())
            }
            ("caller", []) => {
                self.sync()?;
                let reply = self.host.caller();
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("origin", []) => {
                self.sync()?;
                let reply = self.host.original_caller();
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("self", []) => {
                self.sync()?;
                let reply = self.host.contract();
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("pay", []) => {
                self.sync()?;
                let reply = self.host.pay_amount();
                self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
                Ok(())
            }
            ("block", []) => {
                self.sync()?;
                let reply = self.host.block_number();
                self.last = self.absorb(reply)?.to_string().into_bytes();
                Ok(())
            }
            ("gas", [amount]) => {
                let amount = amount
                    .parse::<u64>()
                    .map_err(|_| Halt::Fail(format!("invalid gas amount {}", amount)))?;
                self.charge(amount)
            }
            ("require", [left, right]) => {
                if self.operand(left)? == self.operand(right)? {
                    Ok(())
                } else {
                    Err(Halt::Fail(format!("requirement failed: {} == {}", left, right)))
                }
            }
            ("fail", words) => Err(Halt::Fail(words.join(" "))),
            ("panic", []) => panic!("script panic"),
            ("return", []) => Err(Halt::Return(std::mem::take(&mut self.last))),
            ("return", [value]) => Err(Halt::Return(self.operand(value)?)),
            _ => Err(Halt::Fail(format!("invalid instruction: {}", line))),
        }
    }

    fn call(
        &mut self,
        address: &str,
        method: &str,
        gas: &str,
        rest: &[&str],
        strict: bool,
    ) -> Result<(), Halt> {
        let address = self.address(address)?;
        let gas_limit = self.gas(gas)?;
        let (amount, args) = self.value_and_args(rest)?;
        let packed = pack_arguments(&args);
        self.sync()?;
        let reply = self.host.call(NestedCall {
            address: ByteView::new(&address),
            method: ByteView::new(method.as_bytes()),
            args: ByteView::new(&packed),
            amount: ByteView::new(&amount),
            gas_limit,
            invocation_context: ByteView::absent(),
        });
        self.nested(reply, strict)
    }

    /// Deploy this contract's own code again under `nonce`; `$last` becomes
    /// the new contract's address.
    fn deploy(&mut self, nonce: &str, gas: &str, rest: &[&str]) -> Result<(), Halt> {
        let nonce = self.operand(nonce)?;
        let gas_limit = self.gas(gas)?;
        let (amount, args) = self.value_and_args(rest)?;
        let packed = pack_arguments(&args);

        self.sync()?;
        let reply = self.host.own_code();
        let code = self.absorb(reply)?.into_vec().unwrap_or_default();

        self.sync()?;
        let reply = self.host.deploy(NestedDeploy {
            code: ByteView::new(&code),
            args: ByteView::new(&packed),
            nonce: ByteView::new(&nonce),
            amount: ByteView::new(&amount),
            gas_limit,
        });
        self.nested(reply, true)?;

        self.sync()?;
        let reply = self.host.contract_addr(
            ByteView::new(&code),
            ByteView::new(&packed),
            ByteView::new(&nonce),
        );
        self.last = self.absorb(reply)?.into_vec().unwrap_or_default();
        Ok(())
    }

    /// `$last` becomes the child's output; a failed child halts the script
    /// only when `strict`.
    fn nested(&mut self, reply: Reply<Buffer>, strict: bool) -> Result<(), Halt> {
        let tolerated = !strict && reply.status == Status::ContractError;
        let child = reply
            .value
            .as_slice()
            .and_then(|bytes| ActionResult::from_bytes(bytes).ok());
        if tolerated {
            self.charge(reply.gas_used)?;
        } else {
            self.absorb(reply)?;
        }
        self.last = child.map(|result| result.output_data).unwrap_or_default();
        Ok(())
    }

    fn value_and_args(&self, rest: &[&str]) -> Result<(Vec<u8>, Vec<Vec<u8>>), Halt> {
        match rest.split_first() {
            Some((first, args)) if first.starts_with("value=") => {
                let amount = self.amount(&first["value=".len()..])?;
                Ok((amount, self.operands(args)?))
            }
            _ => Ok((Vec::new(), self.operands(rest)?)),
        }
    }

    fn gas(&self, token: &str) -> Result<u64, Halt> {
        token
            .parse::<u64>()
            .map_err(|_| Halt::Fail(format!("invalid gas limit {}", token)))
    }

    fn operands(&self, tokens: &[&str]) -> Result<Vec<Vec<u8>>, Halt> {
        tokens.iter().map(|token| self.operand(token)).collect()
    }

    fn operand(&self, token: &str) -> Result<Vec<u8>, Halt> {
        if token == "$last" {
            return Ok(self.last.clone());
        }
        if let Some(index) = token.strip_prefix('$') {
            let index = index
                .parse::<usize>()
                .map_err(|_| Halt::Fail(format!("invalid operand {}", token)))?;
            return self
                .args
                .get(index)
                .cloned()
                .ok_or_else(|| Halt::Fail(format!("missing argument {}", index)));
        }
        if let Some(hex_part) = token.strip_prefix("0x") {
            return hex::decode(hex_part).map_err(|_| Halt::Fail(format!("invalid hex {}", token)));
        }
        if token == "_" {
            return Ok(Vec::new());
        }
        Ok(token.as_bytes().to_vec())
    }

    fn address(&self, token: &str) -> Result<Vec<u8>, Halt> {
        if token.starts_with("wh1") {
            return Address::from_str(token)
                .map(|address| address.as_bytes().to_vec())
                .map_err(|e| Halt::Fail(e.to_string()));
        }
        self.operand(token)
    }

    fn amount(&self, token: &str) -> Result<Vec<u8>, Halt> {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            return Amount::from_str(token)
                .map(|amount| amount.to_be_bytes())
                .map_err(|e| Halt::Fail(e.to_string()));
        }
        self.operand(token)
    }
}
