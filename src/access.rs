//! Owner capability and the registered-caller set.
//!
//! Both grant and revoke take effect in the call that makes them. The owner is
//! already the trust root, so a delay on grants would not reduce risk, and a
//! compromised caller has to be cut off without waiting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ErrorKind;
use crate::types::{Address, CallContext};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("{caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("{caller} is not a registered caller")]
    NotRegistered { caller: Address },
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Unauthorized
    }
}

/// The single governance identity. Checked explicitly on every privileged call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    owner: Address,
}

impl Ownership {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, address: Address) -> bool {
        self.owner == address
    }

    pub fn ensure_owner(&self, caller: Address) -> Result<(), AccessError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(AccessError::NotOwner { caller })
        }
    }

    /// Hands the capability to `new_owner` immediately. Returns the previous owner.
    pub fn transfer(&mut self, ctx: &CallContext, new_owner: Address) -> Result<Address, AccessError> {
        self.ensure_owner(ctx.caller)?;
        let previous = self.owner;
        self.owner = new_owner;
        Ok(previous)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRegistry {
    ownership: Ownership,
    allowed: BTreeSet<Address>,
}

impl AccessRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            ownership: Ownership::new(owner),
            allowed: BTreeSet::new(),
        }
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn ensure_owner(&self, caller: Address) -> Result<(), AccessError> {
        self.ownership.ensure_owner(caller)
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> Result<Address, AccessError> {
        self.ownership.transfer(ctx, new_owner)
    }

    /// Returns true if `address` was not already registered.
    pub fn grant(&mut self, ctx: &CallContext, address: Address) -> Result<bool, AccessError> {
        self.ownership.ensure_owner(ctx.caller)?;
        Ok(self.allowed.insert(address))
    }

    /// Returns true if `address` was registered. Revoking a stranger is a no-op.
    pub fn revoke(&mut self, ctx: &CallContext, address: Address) -> Result<bool, AccessError> {
        self.ownership.ensure_owner(ctx.caller)?;
        Ok(self.allowed.remove(&address))
    }

    pub fn is_allowed(&self, address: Address) -> bool {
        self.allowed.contains(&address)
    }

    pub fn ensure_allowed(&self, caller: Address) -> Result<(), AccessError> {
        if self.is_allowed(caller) {
            Ok(())
        } else {
            Err(AccessError::NotRegistered { caller })
        }
    }

    pub fn allowed(&self) -> impl Iterator<Item = Address> + '_ {
        self.allowed.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    const OWNER: Address = Address(1);
    const CALLER: Address = Address(7);

    fn as_owner() -> CallContext {
        CallContext::new(OWNER, Timestamp::from_secs(0))
    }

    #[test]
    fn grant_is_idempotent() {
        let mut registry = AccessRegistry::new(OWNER);
        assert!(registry.grant(&as_owner(), CALLER).unwrap());
        let once = registry.clone();
        assert!(!registry.grant(&as_owner(), CALLER).unwrap());
        assert_eq!(registry, once);
        assert!(registry.is_allowed(CALLER));
    }

    #[test]
    fn revoke_unknown_is_noop() {
        let mut registry = AccessRegistry::new(OWNER);
        let before = registry.clone();
        assert!(!registry.revoke(&as_owner(), CALLER).unwrap());
        assert_eq!(registry, before);
    }

    #[test]
    fn revoke_takes_effect_immediately() {
        let mut registry = AccessRegistry::new(OWNER);
        registry.grant(&as_owner(), CALLER).unwrap();
        assert!(registry.ensure_allowed(CALLER).is_ok());

        assert!(registry.revoke(&as_owner(), CALLER).unwrap());
        assert_eq!(
            registry.ensure_allowed(CALLER),
            Err(AccessError::NotRegistered { caller: CALLER })
        );
    }

    #[test]
    fn non_owner_cannot_grant_or_revoke() {
        let mut registry = AccessRegistry::new(OWNER);
        let stranger = CallContext::new(CALLER, Timestamp::from_secs(0));

        let err = registry.grant(&stranger, CALLER).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!registry.is_allowed(CALLER));

        assert!(registry.revoke(&stranger, CALLER).is_err());
    }

    #[test]
    fn ownership_transfer_moves_capability() {
        let mut registry = AccessRegistry::new(OWNER);
        let previous = registry.transfer_ownership(&as_owner(), CALLER).unwrap();
        assert_eq!(previous, OWNER);
        assert_eq!(registry.owner(), CALLER);
        assert!(registry.grant(&as_owner(), Address(9)).is_err());
    }
}
