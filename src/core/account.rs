//! Account state: balance and replay-protection nonce.

use crate::core::ledger::LedgerError;
use appchain_derive::BinaryCodec;

/// Canonical representation of one account.
///
/// Owned exclusively by the ledger and mutated only inside a transaction
/// application step. All fields are encoded deterministically so accounts
/// can feed the world-state digest directly.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq, Default)]
pub struct Account {
    /// Spendable balance denominated in the native currency.
    balance: u128,
    /// Monotonic counter of successfully applied transactions from this
    /// account.
    nonce: u64,
}

impl Account {
    /// Creates a new account with the given balance.
    pub fn new(balance: u128) -> Self {
        Self { balance, nonce: 0 }
    }

    /// Returns the account's current balance.
    pub fn balance(&self) -> u128 {
        self.balance
    }

    /// Returns the account's current nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Removes funds, rejecting any charge that would overdraw.
    pub fn charge(&mut self, amount: u128) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                balance: self.balance,
                required: amount,
            })?;
        Ok(())
    }

    /// Adds funds.
    pub fn deposit(&mut self, amount: u128) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }

    /// Advances the nonce by exactly one.
    pub fn increment_nonce(&mut self) {
        self.nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn new_account_starts_at_nonce_zero() {
        let account = Account::new(1_000);
        assert_eq!(account.balance(), 1_000);
        assert_eq!(account.nonce(), 0);
    }

    #[test]
    fn charge_reduces_balance() {
        let mut account = Account::new(100);
        account.charge(30).unwrap();
        assert_eq!(account.balance(), 70);
    }

    #[test]
    fn charge_rejects_overdraw() {
        let mut account = Account::new(10);
        let err = account.charge(11).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(account.balance(), 10, "failed charge must not mutate");
    }

    #[test]
    fn charge_to_exactly_zero_is_allowed() {
        let mut account = Account::new(10);
        account.charge(10).unwrap();
        assert_eq!(account.balance(), 0);
    }

    #[test]
    fn deposit_rejects_overflow() {
        let mut account = Account::new(u128::MAX);
        assert!(matches!(
            account.deposit(1),
            Err(LedgerError::BalanceOverflow)
        ));
    }

    #[test]
    fn nonce_increments_by_one() {
        let mut account = Account::new(0);
        account.increment_nonce();
        account.increment_nonce();
        assert_eq!(account.nonce(), 2);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut account = Account::new(123_456_789);
        account.increment_nonce();

        let encoded = account.to_bytes();
        let decoded = Account::from_bytes(&encoded).expect("decode");
        assert_eq!(decoded, account);
    }
}
