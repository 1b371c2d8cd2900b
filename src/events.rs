// 7.0: every committed state change produces an event. used for audit trails and
// for notifying off-ledger systems. rejected calls produce none.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, EntryId, Timestamp, TokenAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Governance events
    AccessGranted(AccessEvent),
    AccessRevoked(AccessEvent),
    OwnershipTransferred(OwnershipTransferredEvent),

    // Ledger balance events
    Deposited(DepositedEvent),
    Withdrawn(WithdrawnEvent),
    Moved(MovedEvent),
    ExcessWithdrawn(ExcessWithdrawnEvent),

    // Gateway rotation events
    GatewayRotationRequested(GatewayRotationRequestedEvent),
    GatewayRotated(GatewayRotatedEvent),

    // Spender authorization events
    AuthorizationRequested(AuthorizationEvent),
    AuthorizationConfirmed(AuthorizationEvent),
    AuthorizationRevoked(AuthorizationRevokedEvent),
    TokensTransferred(TokensTransferredEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransferredEvent {
    pub previous_owner: Address,
    pub new_owner: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositedEvent {
    pub entry_id: EntryId,
    pub token: TokenAddress,
    pub from: Address,
    pub amount: Amount,
    pub new_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawnEvent {
    pub entry_id: EntryId,
    pub token: TokenAddress,
    pub to: Address,
    pub amount: Amount,
    pub new_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedEvent {
    pub from_entry: EntryId,
    pub to_entry: EntryId,
    pub token: TokenAddress,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcessWithdrawnEvent {
    pub token: TokenAddress,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRotationRequestedEvent {
    pub current: Address,
    pub proposed: Address,
    pub committable_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRotatedEvent {
    pub previous: Address,
    pub current: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEvent {
    pub spender: Address,
    pub at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRevokedEvent {
    pub spender: Address,
    // a pending grant was discarded along with the authorization
    pub cleared_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensTransferredEvent {
    pub spender: Address,
    pub token: TokenAddress,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/** 7.1: bounded append-only log. oldest events drop off once max_events is exceeded */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
    next_event_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_event_id: 1,
            max_events,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;

        tracing::debug!(event_id = id.0, payload = ?payload, "event");
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
        id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
