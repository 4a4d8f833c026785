//! The account ledger: balances, nonces and their invariants.
//!
//! The ledger is the sole authority on balances and expected nonces.
//! Accounts spring into existence on first touch with a zero balance, so
//! reads never fail; writes that would drive a balance negative are
//! rejected before any mutation.

use crate::core::account::Account;
use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use appchain_derive::Error;
use dashmap::DashMap;

/// Errors raised by ledger invariant guards.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A debit would overdraw the account.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u128, required: u128 },
    /// A credit would overflow the balance type.
    #[error("balance overflow")]
    BalanceOverflow,
}

/// Thread-safe account store.
///
/// Reads (`balance_of`, `next_nonce`) are lock-free and may run
/// concurrently with the apply stream; the worker serializes mutations.
pub struct Ledger {
    accounts: DashMap<Address, Account>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Creates a ledger pre-funded with the given genesis allocations.
    pub fn with_accounts(initial: &[(Address, u128)]) -> Self {
        let ledger = Self::new();
        for (address, balance) in initial {
            ledger.accounts.insert(*address, Account::new(*balance));
        }
        ledger
    }

    /// Returns the balance of an address; unknown addresses hold zero.
    pub fn balance_of(&self, address: Address) -> u128 {
        self.accounts
            .get(&address)
            .map(|account| account.balance())
            .unwrap_or(0)
    }

    /// Returns the expected nonce of the next transaction from `address`.
    ///
    /// This is the single authority every nonce check consults.
    pub fn next_nonce(&self, address: Address) -> u64 {
        self.accounts
            .get(&address)
            .map(|account| account.nonce())
            .unwrap_or(0)
    }

    /// Adds funds to an account, creating it if needed.
    pub fn credit(&self, address: Address, amount: u128) -> Result<(), LedgerError> {
        self.accounts.entry(address).or_default().deposit(amount)
    }

    /// Removes funds from an account.
    ///
    /// Fails with [`LedgerError::InsufficientFunds`] when the balance
    /// cannot cover the amount; the account is left untouched.
    pub fn debit(&self, address: Address, amount: u128) -> Result<(), LedgerError> {
        match self.accounts.get_mut(&address) {
            Some(mut account) => account.charge(amount),
            None if amount == 0 => Ok(()),
            None => Err(LedgerError::InsufficientFunds {
                balance: 0,
                required: amount,
            }),
        }
    }

    /// Advances an account's nonce by exactly one.
    pub fn increment_nonce(&self, address: Address) {
        self.accounts.entry(address).or_default().increment_nonce();
    }

    /// Returns a snapshot of an account, if it exists.
    pub fn account(&self, address: Address) -> Option<Account> {
        self.accounts.get(&address).map(|account| account.clone())
    }

    /// Number of materialized accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Produces digest leaves for every account, in canonical address
    /// order: the key is a domain-separated hash of the address, the value
    /// the encoded account record.
    pub fn digest_leaves(&self) -> Vec<(Hash, Vec<u8>)> {
        let mut addresses: Vec<Address> = self.accounts.iter().map(|e| *e.key()).collect();
        addresses.sort();

        let mut leaves = Vec::with_capacity(addresses.len());
        for address in addresses {
            let Some(account) = self.account(address) else {
                continue;
            };

            let mut key = Hash::sha3();
            key.update(b"ACCOUNT_LEAF");
            address.encode(&mut key);
            leaves.push((key.finalize(), account.to_bytes()));
        }
        leaves
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
