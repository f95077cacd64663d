//! Per-frame capability set over the ledger.
//!
//! A [`FrameEnv`] is bound to one contract address and owns that frame's
//! pending [`ChangeSet`]. Reads consult the frame's own overlay, then each
//! suspended ancestor's overlay, then the ledger. Writes only ever touch
//! the frame's own overlay, so nothing is visible to the parent or to
//! siblings until the frame commits.
//!
//! Isolation is therefore one-directional rather than strict: a child sees
//! its ancestors' uncommitted writes. Overlays hold absolute balances, so a
//! child reading the bare ledger would overwrite a parent's pending debit
//! on commit.

use bytes::Bytes;
use std::sync::Arc;
use wasmhost_storage::{ChainInfo, ChangeSet, Ledger, StateView};
use wasmhost_types::{Address, Amount, Event, Hash};

use crate::error::HostError;
use crate::gas_metering::{GasMeter, GasSchedule};

pub struct FrameEnv<'p> {
    ledger: &'p dyn Ledger,
    parent: Option<&'p FrameEnv<'p>>,
    chain: Arc<ChainInfo>,
    schedule: GasSchedule,
    contract: Address,
    caller: Address,
    origin: Address,
    code: Bytes,
    pay_amount: Amount,
    changes: ChangeSet,
}

impl<'p> FrameEnv<'p> {
    /// Environment of a top-level invocation.
    pub fn root(
        ledger: &'p dyn Ledger,
        schedule: GasSchedule,
        contract: Address,
        caller: Address,
        code: Bytes,
    ) -> Self {
        Self {
            ledger,
            parent: None,
            chain: Arc::new(ledger.chain_info()),
            schedule,
            contract,
            caller,
            origin: caller,
            code,
            pay_amount: Amount::zero(),
            changes: ChangeSet::new(),
        }
    }

    /// Environment for a nested call into `target`, with `amount` already
    /// moved from this contract to the target.
    pub fn derive_call(
        &self,
        target: Address,
        code: Bytes,
        amount: Amount,
    ) -> Result<FrameEnv<'_>, HostError> {
        let mut child = self.child(target, code, amount.clone());
        child.transfer_in(&self.contract, &amount)?;
        Ok(child)
    }

    /// Environment for deploying `code` at `address`. The code is installed
    /// in the child overlay, so a failed deploy leaves no trace.
    pub fn derive_deploy(
        &self,
        address: Address,
        code: Bytes,
        amount: Amount,
    ) -> Result<FrameEnv<'_>, HostError> {
        let mut child = self.child(address, code.clone(), amount.clone());
        child.transfer_in(&self.contract, &amount)?;
        child.changes.set_code(address, code);
        Ok(child)
    }

    fn child(&self, contract: Address, code: Bytes, pay_amount: Amount) -> FrameEnv<'_> {
        FrameEnv {
            ledger: self.ledger,
            parent: Some(self),
            chain: Arc::clone(&self.chain),
            schedule: self.schedule,
            contract,
            caller: self.contract,
            origin: self.origin,
            code,
            pay_amount,
            changes: ChangeSet::new(),
        }
    }

    /// Move `amount` from `from` into this frame's contract.
    pub fn transfer_in(&mut self, from: &Address, amount: &Amount) -> Result<(), HostError> {
        if amount.is_zero() {
            return Ok(());
        }
        let available = self.balance(from);
        let rest = available
            .checked_sub(amount)
            .ok_or_else(|| HostError::InsufficientFunds {
                required: amount.clone(),
                available: available.clone(),
            })?;
        self.changes.set_balance(*from, rest);
        let target = self.balance(&self.contract);
        self.changes.set_balance(self.contract, target + amount.clone());
        self.pay_amount = amount.clone();
        Ok(())
    }

    /// Install code at this frame's address (top-level deploys).
    pub fn install_code(&mut self, code: Bytes) {
        self.changes.set_code(self.contract, code);
    }

    // Storage

    pub fn set_storage(
        &mut self,
        meter: &mut GasMeter,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), HostError> {
        meter.consume_gas(self.schedule.storage_write(key.len()))?;
        self.changes
            .set_storage(self.contract, key.to_vec(), value.to_vec());
        Ok(())
    }

    pub fn get_storage(
        &self,
        meter: &mut GasMeter,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, HostError> {
        self.read_contract_data(meter, &self.contract, key)
    }

    pub fn remove_storage(&mut self, meter: &mut GasMeter, key: &[u8]) -> Result<(), HostError> {
        meter.consume_gas(self.schedule.storage_remove(key.len()))?;
        self.changes.remove_storage(self.contract, key.to_vec());
        Ok(())
    }

    /// Read any contract's storage, priced like a read of our own.
    pub fn read_contract_data(
        &self,
        meter: &mut GasMeter,
        contract: &Address,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, HostError> {
        let value = self.storage(contract, key);
        let len = value.as_ref().map(Vec::len).unwrap_or(0);
        meter.consume_gas(self.schedule.storage_read(len))?;
        Ok(value)
    }

    // Balances

    pub fn own_balance(&self) -> Amount {
        self.balance(&self.contract)
    }

    pub fn send(
        &mut self,
        meter: &mut GasMeter,
        to: &Address,
        amount: &Amount,
    ) -> Result<(), HostError> {
        meter.consume_gas(self.schedule.transfer)?;
        self.sub_balance(amount)?;
        self.add_balance(to, amount);
        Ok(())
    }

    /// Fail with [`HostError::InsufficientFunds`] unless this contract can
    /// cover `amount`.
    pub fn check_funds(&self, amount: &Amount) -> Result<(), HostError> {
        let available = self.own_balance();
        if available.checked_sub(amount).is_none() {
            return Err(HostError::InsufficientFunds {
                required: amount.clone(),
                available,
            });
        }
        Ok(())
    }

    /// Deduct from this contract's balance.
    pub fn sub_balance(&mut self, amount: &Amount) -> Result<(), HostError> {
        let available = self.own_balance();
        let rest = available
            .checked_sub(amount)
            .ok_or_else(|| HostError::InsufficientFunds {
                required: amount.clone(),
                available: available.clone(),
            })?;
        self.changes.set_balance(self.contract, rest);
        Ok(())
    }

    pub fn add_balance(&mut self, to: &Address, amount: &Amount) {
        let current = self.balance(to);
        self.changes.set_balance(*to, current + amount.clone());
    }

    /// Destroy part of this contract's balance.
    pub fn burn(&mut self, amount: &Amount) -> Result<(), HostError> {
        self.sub_balance(amount)?;
        self.changes.add_burnt(amount);
        Ok(())
    }

    // Chain reads

    pub fn block_number(&self) -> u64 {
        self.chain.block_number
    }

    pub fn block_timestamp(&self) -> i64 {
        self.chain.block_timestamp
    }

    pub fn min_fee_per_gas(&self) -> &Amount {
        &self.chain.min_fee_per_gas
    }

    pub fn block_seed(&self) -> &[u8] {
        &self.chain.block_seed
    }

    pub fn network_size(&self) -> u64 {
        self.chain.network_size
    }

    pub fn epoch(&self) -> u16 {
        self.chain.epoch
    }

    // Identities

    pub fn identity_state(&self, address: &Address) -> u8 {
        self.ledger.identity_state(address)
    }

    pub fn identity(&self, address: &Address) -> Option<Vec<u8>> {
        self.ledger.identity(address)
    }

    // Introspection

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn original_caller(&self) -> Address {
        self.origin
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn own_code(&self) -> &Bytes {
        &self.code
    }

    pub fn own_code_hash(&self) -> Hash {
        Hash::compute(&self.code)
    }

    pub fn contract_code(&self, address: &Address) -> Option<Bytes> {
        self.code(address)
    }

    pub fn contract_addr(&self, code: &[u8], args: &[u8], nonce: &[u8]) -> Address {
        Address::derive_contract(code, args, nonce)
    }

    pub fn pay_amount(&self) -> &Amount {
        &self.pay_amount
    }

    pub fn event(
        &mut self,
        meter: &mut GasMeter,
        name: String,
        args: Vec<Vec<u8>>,
    ) -> Result<(), HostError> {
        let event = Event::new(self.contract, name, args);
        meter.consume_gas(self.schedule.event(event.payload_len()))?;
        self.changes.push_event(event);
        Ok(())
    }

    /// Events emitted in this frame and in committed descendants.
    pub fn events(&self) -> &[Event] {
        self.changes.events()
    }

    // Frame boundary

    /// Finalize this frame, handing its overlay to whoever created it.
    pub fn commit(self) -> ChangeSet {
        self.changes
    }

    /// Discard this frame's overlay.
    pub fn clear(self) {
        tracing::trace!(contract = %self.contract, "Discarding frame overlay");
    }

    /// Fold a committed child overlay into this frame.
    pub fn absorb(&mut self, changes: ChangeSet) {
        self.changes.merge(changes);
    }
}

impl StateView for FrameEnv<'_> {
    fn storage(&self, contract: &Address, key: &[u8]) -> Option<Vec<u8>> {
        match self.changes.storage(contract, key) {
            Some(value) => value.map(<[u8]>::to_vec),
            None => match self.parent {
                Some(parent) => parent.storage(contract, key),
                None => self.ledger.storage(contract, key),
            },
        }
    }

    fn balance(&self, address: &Address) -> Amount {
        match self.changes.balance(address) {
            Some(balance) => balance.clone(),
            None => match self.parent {
                Some(parent) => parent.balance(address),
                None => self.ledger.balance(address),
            },
        }
    }

    fn code(&self, address: &Address) -> Option<Bytes> {
        match self.changes.code(address) {
            Some(code) => Some(code.clone()),
            None => match self.parent {
                Some(parent) => parent.code(address),
                None => self.ledger.code(address),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmhost_storage::MemoryLedger;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn ledger() -> MemoryLedger {
        MemoryLedger::default()
            .with_balance(addr(1), Amount::from(100u64))
            .with_code(addr(1), Bytes::from_static(b"fn run"))
            .with_code(addr(2), Bytes::from_static(b"fn other"))
    }

    fn root(ledger: &MemoryLedger) -> FrameEnv<'_> {
        FrameEnv::root(
            ledger,
            GasSchedule::default(),
            addr(1),
            addr(9),
            Bytes::from_static(b"fn run"),
        )
    }

    #[test]
    fn test_storage_charges() {
        let ledger = ledger();
        let mut env = root(&ledger);
        let mut meter = GasMeter::new(1_000);

        env.set_storage(&mut meter, b"key", b"a long value").unwrap();
        assert_eq!(meter.gas_consumed(), 3);

        let value = env.get_storage(&mut meter, b"key").unwrap();
        assert_eq!(value, Some(b"a long value".to_vec()));
        assert_eq!(meter.gas_consumed(), 3 + 12);

        env.remove_storage(&mut meter, b"key").unwrap();
        assert_eq!(meter.gas_consumed(), 3 + 12 + 3);
        assert_eq!(env.get_storage(&mut meter, b"key").unwrap(), None);
    }

    #[test]
    fn test_writes_stay_in_overlay() {
        let ledger = ledger();
        let mut env = root(&ledger);
        let mut meter = GasMeter::new(1_000);
        env.set_storage(&mut meter, b"k", b"v").unwrap();
        assert_eq!(ledger.storage(&addr(1), b"k"), None);

        let changes = env.commit();
        ledger.apply(changes).unwrap();
        assert_eq!(ledger.storage(&addr(1), b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_send_and_insufficient_funds() {
        let ledger = ledger();
        let mut env = root(&ledger);
        let mut meter = GasMeter::new(1_000);

        env.send(&mut meter, &addr(3), &Amount::from(30u64)).unwrap();
        assert_eq!(env.own_balance(), Amount::from(70u64));
        assert_eq!(env.balance(&addr(3)), Amount::from(30u64));

        let err = env.send(&mut meter, &addr(3), &Amount::from(71u64)).unwrap_err();
        assert!(matches!(err, HostError::InsufficientFunds { .. }));
        assert_eq!(env.own_balance(), Amount::from(70u64));
        assert!(env.check_funds(&Amount::from(70u64)).is_ok());
        assert!(env.check_funds(&Amount::from(71u64)).is_err());
    }

    #[test]
    fn test_burn() {
        let ledger = ledger();
        let mut env = root(&ledger);
        env.burn(&Amount::from(40u64)).unwrap();
        assert_eq!(env.own_balance(), Amount::from(60u64));
        assert!(env.burn(&Amount::from(61u64)).is_err());
    }

    #[test]
    fn test_child_sees_parent_pending_writes() {
        let ledger = ledger();
        let mut parent = root(&ledger);
        let mut meter = GasMeter::new(1_000);
        parent.set_storage(&mut meter, b"k", b"pending").unwrap();

        let child = parent
            .derive_call(addr(2), Bytes::from_static(b"fn other"), Amount::zero())
            .unwrap();
        assert_eq!(child.storage(&addr(1), b"k"), Some(b"pending".to_vec()));
        assert_eq!(child.caller(), addr(1));
        assert_eq!(child.original_caller(), addr(9));
    }

    #[test]
    fn test_child_transfer_and_revert() {
        let ledger = ledger();
        let mut parent = root(&ledger);
        let mut meter = GasMeter::new(1_000);

        let mut child = parent
            .derive_call(addr(2), Bytes::from_static(b"fn other"), Amount::from(25u64))
            .unwrap();
        assert_eq!(child.own_balance(), Amount::from(25u64));
        assert_eq!(child.pay_amount(), &Amount::from(25u64));
        child.set_storage(&mut meter, b"x", b"1").unwrap();
        child.clear();

        assert_eq!(parent.own_balance(), Amount::from(100u64));
        assert_eq!(parent.storage(&addr(2), b"x"), None);

        let mut child = parent
            .derive_call(addr(2), Bytes::from_static(b"fn other"), Amount::from(25u64))
            .unwrap();
        child.set_storage(&mut meter, b"x", b"1").unwrap();
        let changes = child.commit();
        parent.absorb(changes);
        assert_eq!(parent.own_balance(), Amount::from(75u64));
        assert_eq!(parent.storage(&addr(2), b"x"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_derive_insufficient_funds() {
        let ledger = ledger();
        let parent = root(&ledger);
        let result = parent.derive_call(addr(2), Bytes::new(), Amount::from(101u64));
        assert!(matches!(result, Err(HostError::InsufficientFunds { .. })));
    }

    #[test]
    fn test_self_call_transfer_keeps_balance() {
        let ledger = ledger();
        let parent = root(&ledger);
        let child = parent
            .derive_call(addr(1), Bytes::from_static(b"fn run"), Amount::from(10u64))
            .unwrap();
        assert_eq!(child.own_balance(), Amount::from(100u64));
    }

    #[test]
    fn test_derive_deploy_installs_code_in_overlay() {
        let ledger = ledger();
        let parent = root(&ledger);
        let target = parent.contract_addr(b"fn new", b"", b"1");
        let child = parent
            .derive_deploy(target, Bytes::from_static(b"fn new"), Amount::zero())
            .unwrap();
        assert_eq!(child.contract_code(&target), Some(Bytes::from_static(b"fn new")));
        assert_eq!(parent.contract_code(&target), None);
    }

    #[test]
    fn test_chain_and_identity_reads() {
        let ledger = ledger();
        ledger.set_chain_info(ChainInfo {
            block_number: 7,
            epoch: 3,
            network_size: 11,
            ..Default::default()
        });
        ledger.set_identity(&addr(4), 2, Some(vec![1, 2]));
        let env = root(&ledger);
        assert_eq!(env.block_number(), 7);
        assert_eq!(env.epoch(), 3);
        assert_eq!(env.network_size(), 11);
        assert_eq!(env.identity_state(&addr(4)), 2);
        assert_eq!(env.identity(&addr(4)), Some(vec![1, 2]));
        assert_eq!(env.own_code_hash(), Hash::compute(b"fn run"));
    }

    #[test]
    fn test_event_append() {
        let ledger = ledger();
        let mut env = root(&ledger);
        let mut meter = GasMeter::new(10);
        env.event(&mut meter, "Ping".to_string(), vec![b"a".to_vec()]).unwrap();
        assert_eq!(env.events().len(), 1);
        assert_eq!(env.events()[0].contract, addr(1));
    }
}
