// 4.0 token.rs: the delegated-allowance transfer primitive the gateway calls into.
// the trait is the boundary to untrusted token logic. InMemoryTokens is a
// deterministic stand-in for tests and the simulator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ErrorKind;
use crate::types::{Address, Amount, TokenAddress};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferFailure {
    #[error("allowance {allowance} to {spender} below {requested} for {token}")]
    InsufficientAllowance {
        token: TokenAddress,
        spender: Address,
        allowance: Amount,
        requested: Amount,
    },

    #[error("{holder} holds {balance} of {token}, needs {requested}")]
    InsufficientBalance {
        token: TokenAddress,
        holder: Address,
        balance: Amount,
        requested: Amount,
    },

    #[error("transfer of {token} rejected: {reason}")]
    Rejected { token: TokenAddress, reason: String },
}

impl TransferFailure {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InsufficientAllowanceOrTokenBalance
    }
}

/// Standard delegated-allowance token transfer. `spender` moves `amount` of
/// `token` out of `from` against the allowance `from` granted it.
/// All-or-nothing: on failure no balance or allowance changed.
pub trait TokenTransferPrimitive {
    fn transfer_from(
        &mut self,
        token: TokenAddress,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferFailure>;

    fn balance_of(&self, token: TokenAddress, holder: Address) -> Amount;

    fn allowance(&self, token: TokenAddress, holder: Address, spender: Address) -> Amount;
}

/** 4.1: token balances and allowances held in memory */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryTokens {
    balances: BTreeMap<TokenAddress, BTreeMap<Address, Amount>>,
    allowances: BTreeMap<TokenAddress, BTreeMap<Address, BTreeMap<Address, Amount>>>,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    // supply comes from nowhere. test and simulator setup only.
    pub fn mint(&mut self, token: TokenAddress, holder: Address, amount: Amount) -> Result<(), TransferFailure> {
        let balance = self.balance_of(token, holder);
        let updated = balance.checked_add(amount).ok_or_else(|| TransferFailure::Rejected {
            token,
            reason: "balance overflow".to_string(),
        })?;
        self.set_balance(token, holder, updated);
        Ok(())
    }

    pub fn approve(&mut self, token: TokenAddress, holder: Address, spender: Address, amount: Amount) {
        self.allowances
            .entry(token)
            .or_default()
            .entry(holder)
            .or_default()
            .insert(spender, amount);
    }

    pub fn total_supply(&self, token: TokenAddress) -> Option<Amount> {
        self.balances
            .get(&token)
            .into_iter()
            .flat_map(|holders| holders.values())
            .try_fold(Amount::ZERO, |acc, b| acc.checked_add(*b))
    }

    fn set_balance(&mut self, token: TokenAddress, holder: Address, amount: Amount) {
        self.balances.entry(token).or_default().insert(holder, amount);
    }
}

impl TokenTransferPrimitive for InMemoryTokens {
    fn transfer_from(
        &mut self,
        token: TokenAddress,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferFailure> {
        let allowance = self.allowance(token, from, spender);
        let remaining_allowance = allowance
            .checked_sub(amount)
            .ok_or(TransferFailure::InsufficientAllowance {
                token,
                spender,
                allowance,
                requested: amount,
            })?;

        let balance = self.balance_of(token, from);
        let remaining_balance = balance
            .checked_sub(amount)
            .ok_or(TransferFailure::InsufficientBalance {
                token,
                holder: from,
                balance,
                requested: amount,
            })?;

        // self transfer only spends allowance
        if from != to {
            let credited = self
                .balance_of(token, to)
                .checked_add(amount)
                .ok_or_else(|| TransferFailure::Rejected {
                    token,
                    reason: "recipient balance overflow".to_string(),
                })?;
            self.set_balance(token, from, remaining_balance);
            self.set_balance(token, to, credited);
        }

        // unlimited approvals are never drawn down
        if allowance != Amount::MAX {
            self.approve(token, from, spender, remaining_allowance);
        }
        Ok(())
    }

    fn balance_of(&self, token: TokenAddress, holder: Address) -> Amount {
        self.balances
            .get(&token)
            .and_then(|holders| holders.get(&holder))
            .copied()
            .unwrap_or_default()
    }

    fn allowance(&self, token: TokenAddress, holder: Address, spender: Address) -> Amount {
        self.allowances
            .get(&token)
            .and_then(|by_holder| by_holder.get(&holder))
            .and_then(|by_spender| by_spender.get(&spender))
            .copied()
            .unwrap_or_default()
    }
}
