// 3.0: two-phase state change. propose, wait out the delay, commit inside the grace
// window. past the window the proposal is void and must be proposed again.
//
//   NONE --propose--> PROPOSED --(elapsed >= delay)--> COMMITTABLE --commit--> NONE (applied)
//                                                  \--(elapsed > delay + grace)--> EXPIRED
//
// pure timestamp comparison. owner checks belong to whoever owns the governor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ErrorKind;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockParams {
    // minimum wait between propose and commit
    pub delay_secs: u64,
    // how long after the delay a proposal stays committable
    pub grace_window_secs: u64,
}

impl TimelockParams {
    pub fn new(delay_secs: u64, grace_window_secs: u64) -> Self {
        Self {
            delay_secs,
            grace_window_secs,
        }
    }
}

impl Default for TimelockParams {
    fn default() -> Self {
        Self {
            delay_secs: 86_400,         // 1 day
            grace_window_secs: 604_800, // 1 week
        }
    }
}

/// A proposed value and when it was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange<V> {
    pub proposed_value: V,
    pub proposed_at: Timestamp,
}

impl<V> PendingChange<V> {
    pub fn committable_at(&self, params: &TimelockParams) -> Timestamp {
        self.proposed_at.plus_secs(params.delay_secs)
    }

    // last instant a commit is still accepted
    pub fn expires_after(&self, params: &TimelockParams) -> Timestamp {
        self.committable_at(params).plus_secs(params.grace_window_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    None,
    Proposed,
    Committable,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelockError {
    #[error("timelock not elapsed: committable at {committable_at}, now {now}")]
    NotElapsed { committable_at: Timestamp, now: Timestamp },

    #[error("timelock expired after {expired_after}, now {now}; propose again")]
    Expired { expired_after: Timestamp, now: Timestamp },

    #[error("no pending change to commit")]
    NoPendingChange,
}

impl TimelockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimelockError::NotElapsed { .. } => ErrorKind::TimelockNotElapsed,
            TimelockError::Expired { .. } => ErrorKind::TimelockExpired,
            TimelockError::NoPendingChange => ErrorKind::InvalidState,
        }
    }
}

/** 3.1: one pending change per key. a new proposal for a key replaces the old one and restarts its clock */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelockGovernor<K, V> {
    params: TimelockParams,
    slots: BTreeMap<K, PendingChange<V>>,
}

impl<K: Ord + Clone, V: Clone> TimelockGovernor<K, V> {
    pub fn new(params: TimelockParams) -> Self {
        Self {
            params,
            slots: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &TimelockParams {
        &self.params
    }

    /// Opens (or restarts) the proposal for `key`. Returns the proposal it replaced.
    pub fn propose(&mut self, key: K, value: V, now: Timestamp) -> Option<PendingChange<V>> {
        self.slots.insert(
            key,
            PendingChange {
                proposed_value: value,
                proposed_at: now,
            },
        )
    }

    /// Checks whether `key` could be committed at `now` without touching the slot.
    pub fn check_commit(&self, key: &K, now: Timestamp) -> Result<&PendingChange<V>, TimelockError> {
        let pending = self.slots.get(key).ok_or(TimelockError::NoPendingChange)?;

        let committable_at = pending.committable_at(&self.params);
        if now < committable_at {
            return Err(TimelockError::NotElapsed { committable_at, now });
        }

        let expired_after = pending.expires_after(&self.params);
        if now > expired_after {
            return Err(TimelockError::Expired { expired_after, now });
        }

        Ok(pending)
    }

    /// Applies the pending value for `key` and clears the slot.
    ///
    /// A proposal past its grace window is cleared as well, so the caller has to
    /// propose again. Too-early commits leave the slot as it was.
    pub fn commit(&mut self, key: &K, now: Timestamp) -> Result<V, TimelockError> {
        let checked = self.check_commit(key, now).map(|_| ());
        match checked {
            Ok(()) => self
                .slots
                .remove(key)
                .map(|pending| pending.proposed_value)
                .ok_or(TimelockError::NoPendingChange),
            Err(err @ TimelockError::Expired { .. }) => {
                self.slots.remove(key);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn pending(&self, key: &K) -> Option<&PendingChange<V>> {
        self.slots.get(key)
    }

    pub fn clear(&mut self, key: &K) -> Option<PendingChange<V>> {
        self.slots.remove(key)
    }

    pub fn state(&self, key: &K, now: Timestamp) -> SlotState {
        match self.slots.get(key) {
            None => SlotState::None,
            Some(pending) if now < pending.committable_at(&self.params) => SlotState::Proposed,
            Some(pending) if now > pending.expires_after(&self.params) => SlotState::Expired,
            Some(_) => SlotState::Committable,
        }
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = &K> {
        self.slots.keys()
    }
}
