//! In-memory ledger with JSON snapshot persistence.

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use wasmhost_types::{Address, Amount, Event};

use crate::changeset::ChangeSet;
use crate::error::StorageError;
use crate::ledger::{ChainInfo, Ledger, StateView};

/// Account record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: Amount,
    pub code: Option<Bytes>,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
    pub identity_state: u8,
    pub identity: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    chain: ChainInfo,
    accounts: HashMap<Address, Account>,
    events: Vec<Event>,
    burnt: Amount,
}

/// Reference [`Ledger`] backed by a hash map behind a read-write lock.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
    pub fn new(chain: ChainInfo) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                chain,
                ..Default::default()
            })),
        }
    }

    pub fn with_balance(self, address: Address, balance: Amount) -> Self {
        self.set_balance(&address, balance);
        self
    }

    pub fn with_code(self, address: Address, code: impl Into<Bytes>) -> Self {
        self.set_code(&address, code.into());
        self
    }

    pub fn set_chain_info(&self, chain: ChainInfo) {
        self.state.write().chain = chain;
    }

    pub fn set_balance(&self, address: &Address, balance: Amount) {
        self.state.write().accounts.entry(*address).or_default().balance = balance;
    }

    pub fn set_code(&self, address: &Address, code: Bytes) {
        self.state.write().accounts.entry(*address).or_default().code = Some(code);
    }

    pub fn set_storage(&self, contract: &Address, key: &[u8], value: &[u8]) {
        self.state
            .write()
            .accounts
            .entry(*contract)
            .or_default()
            .storage
            .insert(key.to_vec(), value.to_vec());
    }

    pub fn set_identity(&self, address: &Address, state: u8, identity: Option<Vec<u8>>) {
        let mut guard = self.state.write();
        let account = guard.accounts.entry(*address).or_default();
        account.identity_state = state;
        account.identity = identity;
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.state.read().accounts.get(address).cloned()
    }

    /// Events applied so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.state.read().events.clone()
    }

    pub fn total_burnt(&self) -> Amount {
        self.state.read().burnt.clone()
    }

    /// Write the full ledger state to a JSON file.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StorageError> {
        let snapshot = {
            let state = self.state.read();
            let mut accounts: Vec<AccountSnapshot> = state
                .accounts
                .iter()
                .map(|(address, account)| AccountSnapshot::from_account(address, account))
                .collect();
            accounts.sort_by(|a, b| a.address.cmp(&b.address));
            Snapshot {
                chain: state.chain.clone(),
                accounts,
                events: state.events.clone(),
                burnt: state.burnt.clone(),
            }
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), accounts = snapshot.accounts.len(), "Saved ledger snapshot");
        Ok(())
    }

    /// Load a ledger previously written by [`MemoryLedger::save_snapshot`].
    pub fn load_snapshot(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|e| StorageError::Deserialization(e.to_string()))?;

        let mut accounts = HashMap::with_capacity(snapshot.accounts.len());
        for entry in snapshot.accounts {
            let (address, account) = entry.into_account()?;
            accounts.insert(address, account);
        }
        tracing::info!("Loaded {} accounts from snapshot", accounts.len());

        Ok(Self {
            state: Arc::new(RwLock::new(LedgerState {
                chain: snapshot.chain,
                accounts,
                events: snapshot.events,
                burnt: snapshot.burnt,
            })),
        })
    }
}

impl StateView for MemoryLedger {
    fn storage(&self, contract: &Address, key: &[u8]) -> Option<Vec<u8>> {
        self.state
            .read()
            .accounts
            .get(contract)
            .and_then(|account| account.storage.get(key).cloned())
    }

    fn balance(&self, address: &Address) -> Amount {
        self.state
            .read()
            .accounts
            .get(address)
            .map(|account| account.balance.clone())
            .unwrap_or_default()
    }

    fn code(&self, address: &Address) -> Option<Bytes> {
        self.state
            .read()
            .accounts
            .get(address)
            .and_then(|account| account.code.clone())
    }
}

impl Ledger for MemoryLedger {
    fn chain_info(&self) -> ChainInfo {
        self.state.read().chain.clone()
    }

    fn identity_state(&self, address: &Address) -> u8 {
        self.state
            .read()
            .accounts
            .get(address)
            .map(|account| account.identity_state)
            .unwrap_or(0)
    }

    fn identity(&self, address: &Address) -> Option<Vec<u8>> {
        self.state
            .read()
            .accounts
            .get(address)
            .and_then(|account| account.identity.clone())
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let mut state = self.state.write();
        for (contract, key, value) in changes.storage_entries() {
            let storage = &mut state.accounts.entry(*contract).or_default().storage;
            match value {
                Some(value) => {
                    storage.insert(key.to_vec(), value.to_vec());
                }
                None => {
                    storage.remove(key);
                }
            }
        }
        for (address, balance) in changes.balance_entries() {
            state.accounts.entry(*address).or_default().balance = balance.clone();
        }
        for (address, code) in changes.code_entries() {
            state.accounts.entry(*address).or_default().code = Some(code.clone());
        }
        let burnt = changes.burnt().clone();
        state.burnt += &burnt;
        state.events.extend(changes.into_events());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    chain: ChainInfo,
    accounts: Vec<AccountSnapshot>,
    events: Vec<Event>,
    burnt: Amount,
}

/// Account with binary fields hex encoded
#[derive(Debug, Serialize, Deserialize)]
struct AccountSnapshot {
    address: Address,
    balance: Amount,
    code: Option<String>,
    storage: BTreeMap<String, String>,
    identity_state: u8,
    identity: Option<String>,
}

impl AccountSnapshot {
    fn from_account(address: &Address, account: &Account) -> Self {
        Self {
            address: *address,
            balance: account.balance.clone(),
            code: account.code.as_ref().map(hex::encode),
            storage: account
                .storage
                .iter()
                .map(|(k, v)| (hex::encode(k), hex::encode(v)))
                .collect(),
            identity_state: account.identity_state,
            identity: account.identity.as_ref().map(hex::encode),
        }
    }

    fn into_account(self) -> Result<(Address, Account), StorageError> {
        let mut storage = BTreeMap::new();
        for (k, v) in &self.storage {
            storage.insert(hex::decode(k)?, hex::decode(v)?);
        }
        let account = Account {
            balance: self.balance,
            code: self.code.map(hex::decode).transpose()?.map(Bytes::from),
            storage,
            identity_state: self.identity_state,
            identity: self.identity.map(hex::decode).transpose()?,
        };
        Ok((self.address, account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn test_reads_default_to_empty() {
        let ledger = MemoryLedger::default();
        assert_eq!(ledger.balance(&addr(1)), Amount::zero());
        assert_eq!(ledger.storage(&addr(1), b"k"), None);
        assert_eq!(ledger.code(&addr(1)), None);
        assert_eq!(ledger.identity_state(&addr(1)), 0);
    }

    #[test]
    fn test_apply_changeset() {
        let ledger = MemoryLedger::default().with_balance(addr(1), Amount::from(100u64));
        ledger.set_storage(&addr(1), b"gone", b"x");

        let mut changes = ChangeSet::new();
        changes.set_balance(addr(1), Amount::from(60u64));
        changes.set_balance(addr(2), Amount::from(40u64));
        changes.set_storage(addr(1), b"k".to_vec(), b"v".to_vec());
        changes.remove_storage(addr(1), b"gone".to_vec());
        changes.set_code(addr(3), Bytes::from_static(b"code"));
        changes.push_event(Event::new(addr(1), "Moved", vec![]));
        changes.add_burnt(&Amount::from(5u64));

        ledger.apply(changes).unwrap();
        assert_eq!(ledger.balance(&addr(1)), Amount::from(60u64));
        assert_eq!(ledger.balance(&addr(2)), Amount::from(40u64));
        assert_eq!(ledger.storage(&addr(1), b"k"), Some(b"v".to_vec()));
        assert_eq!(ledger.storage(&addr(1), b"gone"), None);
        assert_eq!(ledger.code(&addr(3)), Some(Bytes::from_static(b"code")));
        assert_eq!(ledger.events().len(), 1);
        assert_eq!(ledger.total_burnt(), Amount::from(5u64));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");

        let chain = ChainInfo {
            block_number: 42,
            min_fee_per_gas: Amount::from(3u64),
            ..Default::default()
        };
        let ledger = MemoryLedger::new(chain.clone())
            .with_balance(addr(1), Amount::from(7u64))
            .with_code(addr(2), Bytes::from_static(b"fn run\nreturn ok"));
        ledger.set_storage(&addr(2), &[0, 1], &[0xff]);
        ledger.set_identity(&addr(1), 3, Some(vec![9, 9]));
        ledger.save_snapshot(&path).unwrap();

        let loaded = MemoryLedger::load_snapshot(&path).unwrap();
        assert_eq!(loaded.chain_info(), chain);
        assert_eq!(loaded.account(&addr(1)), ledger.account(&addr(1)));
        assert_eq!(loaded.account(&addr(2)), ledger.account(&addr(2)));
        assert_eq!(loaded.identity(&addr(1)), Some(vec![9, 9]));
    }

    #[test]
    fn test_load_snapshot_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = MemoryLedger::load_snapshot(&temp_dir.path().join("absent.json"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_clone_shares_state() {
        let ledger = MemoryLedger::default();
        let handle = ledger.clone();
        handle.set_balance(&addr(9), Amount::from(1u64));
        assert_eq!(ledger.balance(&addr(9)), Amount::from(1u64));
    }
}
