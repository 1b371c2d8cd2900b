//! Transfer gateway: the only component that moves custodied tokens.
//!
//! Holders approve the gateway once. From then on any spender the gateway has
//! authorized can move their tokens through [`TokenGateway::transfer_tokens`].
//! New spenders are added through a timelocked request/confirm pair; removing
//! one is immediate and also discards any grant still waiting.
//!
//! The gateway keeps no balances. Tokens pass straight from `from` to `to`, and
//! neither side may be the gateway itself.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::access::{AccessError, Ownership};
use crate::error::ErrorKind;
use crate::events::{
    AuthorizationEvent, AuthorizationRevokedEvent, Event, EventLog, EventPayload,
    OwnershipTransferredEvent, TokensTransferredEvent,
};
use crate::timelock::{PendingChange, SlotState, TimelockError, TimelockGovernor, TimelockParams};
use crate::token::{TokenTransferPrimitive, TransferFailure};
use crate::types::{Address, Amount, CallContext, Timestamp, TokenAddress};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{spender} is not an authorized spender")]
    NotAuthorized { spender: Address },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Timelock(#[from] TimelockError),

    #[error("token transfer failed: {0}")]
    Transfer(#[from] TransferFailure),

    #[error("gateway {gateway} cannot be a transfer counterparty")]
    GatewayCounterparty { gateway: Address },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NotAuthorized { .. } => ErrorKind::Unauthorized,
            GatewayError::Access(e) => e.kind(),
            GatewayError::Timelock(e) => e.kind(),
            GatewayError::Transfer(e) => e.kind(),
            GatewayError::GatewayCounterparty { .. } => ErrorKind::InvalidState,
        }
    }
}

/// The narrow surface the ledger routes token movement through.
pub trait TokenGateway {
    fn address(&self) -> Address;

    /// Moves `amount` of `token` from `from` to `to`. `ctx.caller` must be an
    /// authorized spender. Fails as a whole or not at all.
    fn transfer_tokens(
        &mut self,
        ctx: &CallContext,
        tokens: &mut dyn TokenTransferPrimitive,
        token: TokenAddress,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferGateway {
    address: Address,
    ownership: Ownership,
    authorized: BTreeSet<Address>,
    // pending grants keyed by spender
    pending: TimelockGovernor<Address, bool>,
    log: EventLog,
}

impl TransferGateway {
    pub fn new(address: Address, owner: Address, access: TimelockParams, max_events: usize) -> Self {
        Self {
            address,
            ownership: Ownership::new(owner),
            authorized: BTreeSet::new(),
            pending: TimelockGovernor::new(access),
            log: EventLog::new(max_events),
        }
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn timelock_params(&self) -> &TimelockParams {
        self.pending.params()
    }

    /// Opens the timelocked grant for `spender`. Returns when it becomes committable.
    pub fn request_authorization(&mut self, ctx: &CallContext, spender: Address) -> Result<Timestamp, GatewayError> {
        self.ownership.ensure_owner(ctx.caller).inspect_err(|e| {
            warn!(caller = %ctx.caller, %spender, error = %e, "authorization request rejected");
        })?;

        if self.pending.propose(spender, true, ctx.now).is_some() {
            info!(%spender, "replacing pending authorization request");
        }
        let committable_at = ctx.now.plus_secs(self.pending.params().delay_secs);

        self.log.emit(
            ctx.now,
            EventPayload::AuthorizationRequested(AuthorizationEvent { spender, at: committable_at }),
        );
        info!(%spender, %committable_at, "authorization requested");
        Ok(committable_at)
    }

    /// Commits a grant whose delay has passed. A grant past its grace window is
    /// discarded and has to be requested again.
    pub fn confirm_authorization(&mut self, ctx: &CallContext, spender: Address) -> Result<(), GatewayError> {
        self.ownership.ensure_owner(ctx.caller).inspect_err(|e| {
            warn!(caller = %ctx.caller, %spender, error = %e, "authorization confirm rejected");
        })?;

        let granted = self.pending.commit(&spender, ctx.now).inspect_err(|e| {
            warn!(%spender, error = %e, "authorization confirm failed");
        })?;

        if granted {
            self.authorized.insert(spender);
        }
        self.log.emit(
            ctx.now,
            EventPayload::AuthorizationConfirmed(AuthorizationEvent { spender, at: ctx.now }),
        );
        info!(%spender, "spender authorized");
        Ok(())
    }

    /// Removes `spender` immediately and drops any grant still pending for it.
    /// Returns whether the spender had been authorized.
    pub fn revoke_authorization(&mut self, ctx: &CallContext, spender: Address) -> Result<bool, GatewayError> {
        self.ownership.ensure_owner(ctx.caller).inspect_err(|e| {
            warn!(caller = %ctx.caller, %spender, error = %e, "authorization revoke rejected");
        })?;

        let was_authorized = self.authorized.remove(&spender);
        let cleared_pending = self.pending.clear(&spender).is_some();

        self.log.emit(
            ctx.now,
            EventPayload::AuthorizationRevoked(AuthorizationRevokedEvent {
                spender,
                cleared_pending,
            }),
        );
        info!(%spender, was_authorized, cleared_pending, "spender revoked");
        Ok(was_authorized)
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<(), GatewayError> {
        let previous_owner = self.ownership.transfer(ctx, new_owner)?;
        self.log.emit(
            ctx.now,
            EventPayload::OwnershipTransferred(OwnershipTransferredEvent {
                previous_owner,
                new_owner,
            }),
        );
        info!(%previous_owner, %new_owner, "gateway ownership transferred");
        Ok(())
    }

    pub fn is_authorized(&self, spender: Address) -> bool {
        self.authorized.contains(&spender)
    }

    pub fn authorized_spenders(&self) -> impl Iterator<Item = Address> + '_ {
        self.authorized.iter().copied()
    }

    pub fn pending_authorization(&self, spender: Address) -> Option<&PendingChange<bool>> {
        self.pending.pending(&spender)
    }

    pub fn authorization_state(&self, spender: Address, now: Timestamp) -> SlotState {
        self.pending.state(&spender, now)
    }

    /// How much of `token` the gateway could move out of `holder` right now.
    pub fn available(&self, tokens: &dyn TokenTransferPrimitive, token: TokenAddress, holder: Address) -> Amount {
        let balance = tokens.balance_of(token, holder);
        let allowance = tokens.allowance(token, holder, self.address);
        balance.min(allowance)
    }

    pub fn events(&self) -> &[Event] {
        self.log.events()
    }
}

impl TokenGateway for TransferGateway {
    fn address(&self) -> Address {
        self.address
    }

    fn transfer_tokens(
        &mut self,
        ctx: &CallContext,
        tokens: &mut dyn TokenTransferPrimitive,
        token: TokenAddress,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), GatewayError> {
        let spender = ctx.caller;
        if !self.is_authorized(spender) {
            warn!(%spender, %token, "transfer from unauthorized spender");
            return Err(GatewayError::NotAuthorized { spender });
        }
        if from == self.address || to == self.address {
            warn!(%spender, %token, %from, %to, "transfer through the gateway's own address refused");
            return Err(GatewayError::GatewayCounterparty { gateway: self.address });
        }

        if amount.is_zero() {
            return Ok(());
        }

        tokens
            .transfer_from(token, self.address, from, to, amount)
            .inspect_err(|e| {
                warn!(%spender, %token, %from, %to, %amount, error = %e, "token transfer failed");
            })?;

        self.log.emit(
            ctx.now,
            EventPayload::TokensTransferred(TokensTransferredEvent {
                spender,
                token,
                from,
                to,
                amount,
            }),
        );
        Ok(())
    }
}
