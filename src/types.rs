// 1.0: all the primitives live here. participants, tokens, entries, amounts, time.
// each is a newtype so the compiler catches a token passed where a holder belongs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::Clock;

// owner, caller, holder, ledger, gateway: anything that can hold tokens or call in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAddress(pub u64);

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:0x{:016x}", self.0)
    }
}

// 1.1: opaque position key. never constructed by the ledger, only used to index balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub [u8; 32]);

impl EntryId {
    pub const LEN: usize = 32;

    /// Left-aligns `name` into a zero-padded 32 byte key. `None` if it does not fit.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > Self::LEN {
            return None;
        }
        let mut raw = [0u8; 32];
        raw[..bytes.len()].copy_from_slice(bytes);
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        match std::str::from_utf8(&self.0[..end]) {
            Ok(name) if !name.is_empty() && !name.contains('\0') => write!(f, "{}", name),
            _ => {
                for byte in self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

// 1.2: token quantity in base units. never negative, so every decrease is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u128::MAX);

    pub fn new(units: u128) -> Self {
        Self(units)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(&self, other: Amount) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(&self, other: Amount) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(&self, other: Amount) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Human-readable quantity for a token with `decimals` places.
    /// `None` when the amount is outside what a Decimal can carry.
    pub fn to_units(&self, decimals: u32) -> Option<Decimal> {
        let raw = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(raw, decimals).ok()
    }
}

impl From<u128> for Amount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: second-resolution timestamp. all timelock math compares these, nothing sleeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    // zero if `earlier` is actually later
    pub fn secs_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/** 1.4: who is calling and when. read once per call so the whole call sees one instant */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }

    pub fn at(caller: Address, clock: &dyn Clock) -> Self {
        Self {
            caller,
            now: clock.now(),
        }
    }

    // same instant, different caller. used when one component calls the next.
    pub fn as_caller(&self, caller: Address) -> Self {
        Self {
            caller,
            now: self.now,
        }
    }
}
