//! Per-entry token accounting over custodied funds.
//!
//! The ledger records which entry owns how much of each token it holds. It never
//! moves tokens itself; deposits and withdrawals go through the current gateway.
//!
//! Invariants, holding after every call:
//!
//! - for every token, the entry balances sum to the cached total
//! - the cached total never exceeds what the ledger actually custodies
//!
//! Every transfer is measured: the ledger's own token balance has to move by
//! exactly the requested amount, otherwise nothing is booked.
//!
//! Calls that leave the ledger order their work around the external transfer:
//! credits are written only after the transfer landed, debits are written before
//! the transfer starts and restored if it fails. A failed call leaves the ledger
//! exactly as it found it.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::access::{AccessError, AccessRegistry};
use crate::config::CustodyConfig;
use crate::error::ErrorKind;
use crate::events::{
    AccessEvent, DepositedEvent, Event, EventLog, EventPayload, ExcessWithdrawnEvent,
    GatewayRotatedEvent, GatewayRotationRequestedEvent, MovedEvent, OwnershipTransferredEvent,
    WithdrawnEvent,
};
use crate::gateway::{GatewayError, TokenGateway};
use crate::timelock::{PendingChange, SlotState, TimelockError, TimelockGovernor, TimelockParams};
use crate::token::TokenTransferPrimitive;
use crate::types::{Address, Amount, CallContext, EntryId, Timestamp, TokenAddress};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("entry {entry_id} holds {available} of {token}, requested {requested}")]
    InsufficientEntryBalance {
        entry_id: EntryId,
        token: TokenAddress,
        available: Amount,
        requested: Amount,
    },

    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Timelock(#[from] TimelockError),

    #[error("gateway {supplied} is not the current gateway {current}")]
    WrongGateway { supplied: Address, current: Address },

    #[error("accounting error for {token}: {reason}")]
    Accounting { token: TokenAddress, reason: &'static str },

    #[error("ledger {ledger} cannot be its own transfer counterparty")]
    LedgerCounterparty { ledger: Address },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Access(e) => e.kind(),
            LedgerError::InsufficientEntryBalance { .. } => ErrorKind::InsufficientEntryBalance,
            LedgerError::Gateway(e) => e.kind(),
            LedgerError::Timelock(e) => e.kind(),
            LedgerError::WrongGateway { .. }
            | LedgerError::Accounting { .. }
            | LedgerError::LedgerCounterparty { .. } => ErrorKind::InvalidState,
        }
    }
}

/// Timelocked settings the ledger governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LedgerSlot {
    GatewayAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    address: Address,
    access: AccessRegistry,
    gateway: Address,
    rotation: TimelockGovernor<LedgerSlot, Address>,
    // zero balances are not stored
    balances: BTreeMap<TokenAddress, BTreeMap<EntryId, Amount>>,
    totals: BTreeMap<TokenAddress, Amount>,
    log: EventLog,
}

impl Ledger {
    /// `update` governs how gateway rotations are timelocked.
    pub fn new(address: Address, owner: Address, gateway: Address, update: TimelockParams, max_events: usize) -> Self {
        Self {
            address,
            access: AccessRegistry::new(owner),
            gateway,
            rotation: TimelockGovernor::new(update),
            balances: BTreeMap::new(),
            totals: BTreeMap::new(),
            log: EventLog::new(max_events),
        }
    }

    pub fn from_config(address: Address, owner: Address, gateway: Address, config: &CustodyConfig) -> Self {
        Self::new(address, owner, gateway, config.update, config.max_events)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn gateway_address(&self) -> Address {
        self.gateway
    }

    pub fn access(&self) -> &AccessRegistry {
        &self.access
    }

    // ---- balances ----

    /// Credits `entry_id` with `amount` of `token` pulled from `from` through the gateway.
    /// Returns the entry's new balance.
    #[allow(clippy::too_many_arguments)]
    pub fn deposit_to_entry(
        &mut self,
        ctx: &CallContext,
        gateway: &mut dyn TokenGateway,
        tokens: &mut dyn TokenTransferPrimitive,
        entry_id: EntryId,
        token: TokenAddress,
        from: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        self.ensure_caller(ctx, "deposit")?;
        self.ensure_gateway(gateway)?;
        self.ensure_counterparty(from)?;

        let new_balance = self.credit_preview(entry_id, token, amount)?;
        let new_total = self.total_preview(token, amount)?;

        // transfer first: nothing is credited until the tokens are actually here
        let custodied = tokens.balance_of(token, self.address);
        gateway
            .transfer_tokens(&ctx.as_caller(self.address), tokens, token, from, self.address, amount)
            .inspect_err(|e| warn!(entry = %entry_id, %token, %from, %amount, error = %e, "deposit failed"))?;

        let received = tokens.balance_of(token, self.address).checked_sub(custodied);
        if received != Some(amount) {
            // whatever did arrive is left as excess for the owner to sweep
            warn!(entry = %entry_id, %token, %from, %amount, ?received, "deposit not received in full");
            return Err(LedgerError::Accounting {
                token,
                reason: "custody did not grow by the deposited amount",
            });
        }

        self.set_balance(entry_id, token, new_balance);
        self.set_total(token, new_total);

        self.log.emit(
            ctx.now,
            EventPayload::Deposited(DepositedEvent {
                entry_id,
                token,
                from,
                amount,
                new_balance,
            }),
        );
        info!(entry = %entry_id, %token, %from, %amount, balance = %new_balance, "deposited");
        Ok(new_balance)
    }

    /// Debits `entry_id` and sends `amount` of `token` to `to` through the gateway.
    /// Returns the entry's new balance.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_from_entry(
        &mut self,
        ctx: &CallContext,
        gateway: &mut dyn TokenGateway,
        tokens: &mut dyn TokenTransferPrimitive,
        entry_id: EntryId,
        token: TokenAddress,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        self.ensure_caller(ctx, "withdraw")?;
        self.ensure_gateway(gateway)?;
        self.ensure_counterparty(to)?;

        let old_balance = self.balance_of(entry_id, token);
        let old_total = self.total_balance_of(token);
        let new_balance = self.debit_preview(entry_id, token, amount)?;
        let new_total = old_total.checked_sub(amount).ok_or(LedgerError::Accounting {
            token,
            reason: "total below entry balance",
        })?;

        // debit first: the entry is already short while the tokens are in flight
        self.set_balance(entry_id, token, new_balance);
        self.set_total(token, new_total);

        let custodied = tokens.balance_of(token, self.address);
        let sent = gateway
            .transfer_tokens(&ctx.as_caller(self.address), tokens, token, self.address, to, amount)
            .map_err(LedgerError::from)
            .and_then(|()| {
                let released = custodied.checked_sub(tokens.balance_of(token, self.address));
                if released == Some(amount) {
                    Ok(())
                } else {
                    Err(LedgerError::Accounting {
                        token,
                        reason: "custody did not shrink by the withdrawn amount",
                    })
                }
            });
        if let Err(e) = sent {
            self.set_balance(entry_id, token, old_balance);
            self.set_total(token, old_total);
            warn!(entry = %entry_id, %token, %to, %amount, error = %e, "withdraw failed, debit restored");
            return Err(e);
        }

        self.log.emit(
            ctx.now,
            EventPayload::Withdrawn(WithdrawnEvent {
                entry_id,
                token,
                to,
                amount,
                new_balance,
            }),
        );
        info!(entry = %entry_id, %token, %to, %amount, balance = %new_balance, "withdrew");
        Ok(new_balance)
    }

    /// Reassigns `amount` of `token` between entries. Totals do not change and
    /// no tokens move.
    pub fn move_between_entries(
        &mut self,
        ctx: &CallContext,
        from_entry: EntryId,
        to_entry: EntryId,
        token: TokenAddress,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_caller(ctx, "move")?;

        let source = self.debit_preview(from_entry, token, amount)?;
        if from_entry != to_entry {
            let destination = self.credit_preview(to_entry, token, amount)?;
            self.set_balance(from_entry, token, source);
            self.set_balance(to_entry, token, destination);
        }

        self.log.emit(
            ctx.now,
            EventPayload::Moved(MovedEvent {
                from_entry,
                to_entry,
                token,
                amount,
            }),
        );
        debug!(from = %from_entry, to = %to_entry, %token, %amount, "moved");
        Ok(())
    }

    /// Sends whatever the ledger holds of `token` beyond its recorded total to
    /// `to`. Covers tokens that arrived without a deposit. Entry balances are
    /// untouched. Returns the amount sent.
    pub fn withdraw_excess_tokens(
        &mut self,
        ctx: &CallContext,
        gateway: &mut dyn TokenGateway,
        tokens: &mut dyn TokenTransferPrimitive,
        token: TokenAddress,
        to: Address,
    ) -> Result<Amount, LedgerError> {
        self.access.ensure_owner(ctx.caller)?;
        self.ensure_gateway(gateway)?;
        self.ensure_counterparty(to)?;

        let excess = tokens
            .balance_of(token, self.address)
            .saturating_sub(self.total_balance_of(token));
        if excess.is_zero() {
            return Ok(Amount::ZERO);
        }

        gateway.transfer_tokens(&ctx.as_caller(self.address), tokens, token, self.address, to, excess)?;

        self.log.emit(
            ctx.now,
            EventPayload::ExcessWithdrawn(ExcessWithdrawnEvent {
                token,
                to,
                amount: excess,
            }),
        );
        info!(%token, %to, amount = %excess, "excess withdrawn");
        Ok(excess)
    }

    pub fn balance_of(&self, entry_id: EntryId, token: TokenAddress) -> Amount {
        self.balances
            .get(&token)
            .and_then(|entries| entries.get(&entry_id))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_balance_of(&self, token: TokenAddress) -> Amount {
        self.totals.get(&token).copied().unwrap_or_default()
    }

    /// Non-zero entry balances for `token`.
    pub fn entries_for(&self, token: TokenAddress) -> impl Iterator<Item = (EntryId, Amount)> + '_ {
        self.balances
            .get(&token)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(id, amount)| (*id, *amount)))
    }

    /// Tokens with a non-zero total.
    pub fn tokens(&self) -> impl Iterator<Item = TokenAddress> + '_ {
        self.totals.keys().copied()
    }

    /// Recomputes every token's entry sum and compares it to the cached total.
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let tokens = self.balances.keys().chain(self.totals.keys());
        for token in tokens {
            let sum = self
                .entries_for(*token)
                .try_fold(Amount::ZERO, |acc, (_, amount)| acc.checked_add(amount))
                .ok_or(LedgerError::Accounting {
                    token: *token,
                    reason: "entry sum overflows",
                })?;
            if sum != self.total_balance_of(*token) {
                return Err(LedgerError::Accounting {
                    token: *token,
                    reason: "entry sum differs from total",
                });
            }
        }
        Ok(())
    }

    /// Confirms the ledger actually holds at least its recorded total of every token.
    pub fn verify_custody(&self, tokens: &dyn TokenTransferPrimitive) -> Result<(), LedgerError> {
        for (token, total) in &self.totals {
            if tokens.balance_of(*token, self.address) < *total {
                return Err(LedgerError::Accounting {
                    token: *token,
                    reason: "custodied amount below total",
                });
            }
        }
        Ok(())
    }

    // ---- access ----

    pub fn grant(&mut self, ctx: &CallContext, address: Address) -> Result<bool, LedgerError> {
        let added = self.access.grant(ctx, address)?;
        if added {
            self.log.emit(ctx.now, EventPayload::AccessGranted(AccessEvent { address }));
            info!(%address, "access granted");
        }
        Ok(added)
    }

    pub fn revoke(&mut self, ctx: &CallContext, address: Address) -> Result<bool, LedgerError> {
        let removed = self.access.revoke(ctx, address)?;
        if removed {
            self.log.emit(ctx.now, EventPayload::AccessRevoked(AccessEvent { address }));
            info!(%address, "access revoked");
        }
        Ok(removed)
    }

    pub fn is_allowed(&self, address: Address) -> bool {
        self.access.is_allowed(address)
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<(), LedgerError> {
        let previous_owner = self.access.transfer_ownership(ctx, new_owner)?;
        self.log.emit(
            ctx.now,
            EventPayload::OwnershipTransferred(OwnershipTransferredEvent {
                previous_owner,
                new_owner,
            }),
        );
        info!(%previous_owner, %new_owner, "ledger ownership transferred");
        Ok(())
    }

    // ---- gateway rotation ----

    /// Proposes `new_address` as the gateway. Replaces any earlier proposal.
    /// Returns when it becomes committable.
    pub fn request_gateway_rotation(&mut self, ctx: &CallContext, new_address: Address) -> Result<Timestamp, LedgerError> {
        self.access.ensure_owner(ctx.caller)?;

        self.rotation.propose(LedgerSlot::GatewayAddress, new_address, ctx.now);
        let committable_at = ctx.now.plus_secs(self.rotation.params().delay_secs);

        self.log.emit(
            ctx.now,
            EventPayload::GatewayRotationRequested(GatewayRotationRequestedEvent {
                current: self.gateway,
                proposed: new_address,
                committable_at,
            }),
        );
        info!(current = %self.gateway, proposed = %new_address, %committable_at, "gateway rotation requested");
        Ok(committable_at)
    }

    /// Switches to the proposed gateway once its delay has passed. Returns the new address.
    pub fn confirm_gateway_rotation(&mut self, ctx: &CallContext) -> Result<Address, LedgerError> {
        self.access.ensure_owner(ctx.caller)?;

        let new_address = self
            .rotation
            .commit(&LedgerSlot::GatewayAddress, ctx.now)
            .inspect_err(|e| warn!(error = %e, "gateway rotation not confirmed"))?;

        let previous = std::mem::replace(&mut self.gateway, new_address);
        self.log.emit(
            ctx.now,
            EventPayload::GatewayRotated(GatewayRotatedEvent {
                previous,
                current: new_address,
            }),
        );
        info!(%previous, current = %new_address, "gateway rotated");
        Ok(new_address)
    }

    pub fn pending_gateway_rotation(&self) -> Option<&PendingChange<Address>> {
        self.rotation.pending(&LedgerSlot::GatewayAddress)
    }

    pub fn gateway_rotation_state(&self, now: Timestamp) -> SlotState {
        self.rotation.state(&LedgerSlot::GatewayAddress, now)
    }

    pub fn events(&self) -> &[Event] {
        self.log.events()
    }

    // ---- internals ----

    fn ensure_caller(&self, ctx: &CallContext, op: &'static str) -> Result<(), LedgerError> {
        self.access.ensure_allowed(ctx.caller).map_err(|e| {
            warn!(caller = %ctx.caller, op, "unregistered caller rejected");
            LedgerError::from(e)
        })
    }

    fn ensure_gateway(&self, gateway: &dyn TokenGateway) -> Result<(), LedgerError> {
        let supplied = gateway.address();
        if supplied != self.gateway {
            return Err(LedgerError::WrongGateway {
                supplied,
                current: self.gateway,
            });
        }
        Ok(())
    }

    fn ensure_counterparty(&self, party: Address) -> Result<(), LedgerError> {
        if party == self.address {
            warn!(ledger = %self.address, "transfer to or from the ledger itself refused");
            return Err(LedgerError::LedgerCounterparty { ledger: self.address });
        }
        Ok(())
    }

    fn debit_preview(&self, entry_id: EntryId, token: TokenAddress, amount: Amount) -> Result<Amount, LedgerError> {
        let available = self.balance_of(entry_id, token);
        available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientEntryBalance {
                entry_id,
                token,
                available,
                requested: amount,
            })
    }

    fn credit_preview(&self, entry_id: EntryId, token: TokenAddress, amount: Amount) -> Result<Amount, LedgerError> {
        self.balance_of(entry_id, token)
            .checked_add(amount)
            .ok_or(LedgerError::Accounting {
                token,
                reason: "entry balance overflow",
            })
    }

    fn total_preview(&self, token: TokenAddress, amount: Amount) -> Result<Amount, LedgerError> {
        self.total_balance_of(token)
            .checked_add(amount)
            .ok_or(LedgerError::Accounting {
                token,
                reason: "total balance overflow",
            })
    }

    fn set_balance(&mut self, entry_id: EntryId, token: TokenAddress, amount: Amount) {
        if amount.is_zero() {
            if let Some(entries) = self.balances.get_mut(&token) {
                entries.remove(&entry_id);
                if entries.is_empty() {
                    self.balances.remove(&token);
                }
            }
        } else {
            self.balances.entry(token).or_default().insert(entry_id, amount);
        }
    }

    fn set_total(&mut self, token: TokenAddress, amount: Amount) {
        if amount.is_zero() {
            self.totals.remove(&token);
        } else {
            self.totals.insert(token, amount);
        }
    }
}
