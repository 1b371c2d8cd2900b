//! End-to-end custody scenarios.
//!
//! Ledger, gateway, and in-memory tokens wired together the way a deployment
//! would be: holders approve the gateway, the ledger is an authorized spender,
//! and a registered caller drives deposits and withdrawals.

use custody_ledger::*;

const OWNER: Address = Address(1);
const LEDGER: Address = Address(10);
const GATEWAY: Address = Address(20);
const NEXT_GATEWAY: Address = Address(21);
const CALLER: Address = Address(30);
const HOLDER: Address = Address(40);
const RECEIVER: Address = Address(50);
const STRANGER: Address = Address(60);
const X: TokenAddress = TokenAddress(100);

const ACCESS_DELAY: u64 = 3_600;
const ACCESS_GRACE: u64 = 86_400;
const UPDATE_DELAY: u64 = 86_400;
const UPDATE_GRACE: u64 = 172_800;

struct Harness {
    clock: ManualClock,
    tokens: InMemoryTokens,
    gateway: TransferGateway,
    ledger: Ledger,
}

fn entry(name: &str) -> EntryId {
    EntryId::from_name(name).unwrap()
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::new(Timestamp::from_secs(1_000_000));
        let access = TimelockParams::new(ACCESS_DELAY, ACCESS_GRACE);
        let update = TimelockParams::new(UPDATE_DELAY, UPDATE_GRACE);

        let mut gateway = TransferGateway::new(GATEWAY, OWNER, access, 10_000);
        let mut ledger = Ledger::new(LEDGER, OWNER, GATEWAY, update, 10_000);

        gateway
            .request_authorization(&CallContext::at(OWNER, &clock), LEDGER)
            .unwrap();
        clock.advance(ACCESS_DELAY);
        gateway
            .confirm_authorization(&CallContext::at(OWNER, &clock), LEDGER)
            .unwrap();
        ledger.grant(&CallContext::at(OWNER, &clock), CALLER).unwrap();

        let mut tokens = InMemoryTokens::new();
        tokens.mint(X, HOLDER, Amount::new(1_000)).unwrap();
        tokens.approve(X, HOLDER, GATEWAY, Amount::new(1_000));
        tokens.approve(X, LEDGER, GATEWAY, Amount::MAX);

        Self {
            clock,
            tokens,
            gateway,
            ledger,
        }
    }

    fn ctx(&self, caller: Address) -> CallContext {
        CallContext::at(caller, &self.clock)
    }

    fn deposit_as(&mut self, caller: Address, name: &str, amount: u128) -> Result<Amount, LedgerError> {
        let ctx = self.ctx(caller);
        self.ledger.deposit_to_entry(
            &ctx,
            &mut self.gateway,
            &mut self.tokens,
            entry(name),
            X,
            HOLDER,
            Amount::new(amount),
        )
    }

    fn deposit(&mut self, name: &str, amount: u128) -> Result<Amount, LedgerError> {
        self.deposit_as(CALLER, name, amount)
    }

    fn withdraw(&mut self, name: &str, to: Address, amount: u128) -> Result<Amount, LedgerError> {
        let ctx = self.ctx(CALLER);
        self.ledger.withdraw_from_entry(
            &ctx,
            &mut self.gateway,
            &mut self.tokens,
            entry(name),
            X,
            to,
            Amount::new(amount),
        )
    }

    fn custodied(&self) -> Amount {
        self.tokens.balance_of(X, LEDGER)
    }
}

#[test]
fn scenario_a_single_deposit() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();

    assert_eq!(h.ledger.balance_of(entry("E1"), X), Amount::new(12));
    assert_eq!(h.ledger.total_balance_of(X), Amount::new(12));
    assert_eq!(h.custodied(), Amount::new(12));
    assert_eq!(h.tokens.balance_of(X, HOLDER), Amount::new(988));
}

#[test]
fn scenario_b_two_entries() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    h.deposit("E2", 24).unwrap();

    assert_eq!(h.ledger.balance_of(entry("E1"), X), Amount::new(12));
    assert_eq!(h.ledger.balance_of(entry("E2"), X), Amount::new(24));
    assert_eq!(h.ledger.total_balance_of(X), Amount::new(36));
    assert_eq!(h.custodied(), Amount::new(36));
    h.ledger.check_invariants().unwrap();
}

#[test]
fn scenario_c_deposit_then_withdraw() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    let before = h.tokens.balance_of(X, RECEIVER);

    assert_eq!(h.withdraw("E1", RECEIVER, 12).unwrap(), Amount::ZERO);

    assert_eq!(h.ledger.balance_of(entry("E1"), X), Amount::ZERO);
    assert_eq!(h.ledger.total_balance_of(X), Amount::ZERO);
    assert_eq!(h.custodied(), Amount::ZERO);
    assert_eq!(h.tokens.balance_of(X, RECEIVER), before.checked_add(Amount::new(12)).unwrap());
}

#[test]
fn scenario_d_overdraw_changes_nothing() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    let ledger_before = h.ledger.clone();
    let gateway_before = h.gateway.clone();
    let tokens_before = h.tokens.clone();

    let err = h.withdraw("E1", RECEIVER, 13).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientEntryBalance);
    assert_eq!(h.ledger, ledger_before);
    assert_eq!(h.gateway, gateway_before);
    assert_eq!(h.tokens, tokens_before);
}

#[test]
fn scenario_e_unregistered_caller() {
    let mut h = Harness::new();
    let ledger_before = h.ledger.clone();
    let tokens_before = h.tokens.clone();

    let err = h.deposit_as(STRANGER, "E1", 12).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.ledger, ledger_before);
    assert_eq!(h.tokens, tokens_before);
}

#[test]
fn scenario_f_gateway_rotation_timelock() {
    let mut h = Harness::new();
    let t0 = h.clock.now();

    h.ledger
        .request_gateway_rotation(&h.ctx(OWNER), NEXT_GATEWAY)
        .unwrap();

    h.clock.set(t0.plus_secs(UPDATE_DELAY - 1));
    let err = h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimelockNotElapsed);
    assert_eq!(h.ledger.gateway_address(), GATEWAY);

    h.clock.set(t0.plus_secs(UPDATE_DELAY));
    assert_eq!(h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap(), NEXT_GATEWAY);
    assert_eq!(h.ledger.gateway_address(), NEXT_GATEWAY);

    // a fresh proposal left past its window
    let proposed_at = h.clock.now();
    h.ledger.request_gateway_rotation(&h.ctx(OWNER), GATEWAY).unwrap();
    h.clock.set(proposed_at.plus_secs(UPDATE_DELAY + UPDATE_GRACE + 1));
    let err = h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimelockExpired);
    assert_eq!(h.ledger.gateway_address(), NEXT_GATEWAY);
    assert!(h.ledger.pending_gateway_rotation().is_none());
}

#[test]
fn rotation_commit_at_window_edge_succeeds() {
    let mut h = Harness::new();
    let t0 = h.clock.now();
    h.ledger
        .request_gateway_rotation(&h.ctx(OWNER), NEXT_GATEWAY)
        .unwrap();
    assert_eq!(h.ledger.gateway_rotation_state(t0), SlotState::Proposed);

    h.clock.set(t0.plus_secs(UPDATE_DELAY + UPDATE_GRACE));
    assert_eq!(h.ledger.gateway_rotation_state(h.clock.now()), SlotState::Committable);
    h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap();
    assert_eq!(h.ledger.gateway_address(), NEXT_GATEWAY);
}

#[test]
fn rotation_is_owner_only_and_needs_a_proposal() {
    let mut h = Harness::new();
    let err = h
        .ledger
        .request_gateway_rotation(&h.ctx(CALLER), NEXT_GATEWAY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn later_rotation_proposal_wins() {
    let mut h = Harness::new();
    h.ledger
        .request_gateway_rotation(&h.ctx(OWNER), Address(70))
        .unwrap();
    h.clock.advance(UPDATE_DELAY / 2);
    h.ledger
        .request_gateway_rotation(&h.ctx(OWNER), NEXT_GATEWAY)
        .unwrap();

    // first proposal's deadline passed, the replacement's has not
    h.clock.advance(UPDATE_DELAY / 2);
    let err = h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimelockNotElapsed);

    h.clock.advance(UPDATE_DELAY / 2);
    assert_eq!(h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap(), NEXT_GATEWAY);
}

#[test]
fn deposits_route_through_rotated_gateway() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();

    // stand up the replacement gateway and let the ledger spend through it
    let mut next = TransferGateway::new(NEXT_GATEWAY, OWNER, TimelockParams::new(ACCESS_DELAY, ACCESS_GRACE), 100);
    next.request_authorization(&h.ctx(OWNER), LEDGER).unwrap();
    h.ledger
        .request_gateway_rotation(&h.ctx(OWNER), NEXT_GATEWAY)
        .unwrap();
    h.clock.advance(UPDATE_DELAY);
    next.confirm_authorization(&h.ctx(OWNER), LEDGER).unwrap();
    h.ledger.confirm_gateway_rotation(&h.ctx(OWNER)).unwrap();
    h.tokens.approve(X, HOLDER, NEXT_GATEWAY, Amount::MAX);
    h.tokens.approve(X, LEDGER, NEXT_GATEWAY, Amount::MAX);

    // old gateway is refused
    let err = h.deposit("E1", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let ctx = h.ctx(CALLER);
    h.ledger
        .withdraw_from_entry(&ctx, &mut next, &mut h.tokens, entry("E1"), X, RECEIVER, Amount::new(12))
        .unwrap();
    assert_eq!(h.tokens.balance_of(X, RECEIVER), Amount::new(12));
    assert_eq!(h.ledger.total_balance_of(X), Amount::ZERO);
}

#[test]
fn component_addresses_cannot_inflate_or_strand_custody() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();

    // the ledger paying itself would double count the same 12
    let ctx = h.ctx(CALLER);
    let err = h
        .ledger
        .deposit_to_entry(&ctx, &mut h.gateway, &mut h.tokens, entry("E2"), X, LEDGER, Amount::new(12))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = h.withdraw("E1", LEDGER, 12).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = h.withdraw("E1", GATEWAY, 12).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    assert_eq!(h.ledger.balance_of(entry("E1"), X), Amount::new(12));
    assert_eq!(h.ledger.total_balance_of(X), Amount::new(12));
    assert_eq!(h.custodied(), Amount::new(12));
    assert_eq!(h.tokens.balance_of(X, GATEWAY), Amount::ZERO);
    h.ledger.verify_custody(&h.tokens).unwrap();
}

#[test]
fn failed_withdraw_rolls_back_everything() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    // the ledger no longer lets the gateway pull its tokens
    h.tokens.approve(X, LEDGER, GATEWAY, Amount::ZERO);

    let ledger_before = h.ledger.clone();
    let tokens_before = h.tokens.clone();
    let err = h.withdraw("E1", RECEIVER, 12).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientAllowanceOrTokenBalance);
    assert_eq!(h.ledger, ledger_before);
    assert_eq!(h.tokens, tokens_before);
    assert_eq!(h.ledger.balance_of(entry("E1"), X), Amount::new(12));
    h.ledger.check_invariants().unwrap();
    h.ledger.verify_custody(&h.tokens).unwrap();
}

#[test]
fn revoked_gateway_authorization_blocks_ledger() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    h.gateway
        .revoke_authorization(&h.ctx(OWNER), LEDGER)
        .unwrap();

    let before = h.ledger.clone();
    let err = h.withdraw("E1", RECEIVER, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.ledger, before);
    assert_eq!(h.custodied(), Amount::new(12));
}

#[test]
fn revoked_caller_is_cut_off_immediately() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    h.ledger.revoke(&h.ctx(OWNER), CALLER).unwrap();
    assert!(!h.ledger.is_allowed(CALLER));

    let err = h.deposit("E1", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let err = h.withdraw("E1", RECEIVER, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[test]
fn holder_allowance_limits_deposits() {
    let mut h = Harness::new();
    h.deposit("E1", 990).unwrap();
    assert_eq!(h.gateway.available(&h.tokens, X, HOLDER), Amount::new(10));

    let before = h.ledger.clone();
    let err = h.deposit("E1", 11).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientAllowanceOrTokenBalance);
    assert_eq!(h.ledger, before);
}

#[test]
fn events_record_committed_changes_only() {
    let mut h = Harness::new();
    h.deposit("E1", 12).unwrap();
    let count = h.ledger.events().len();

    let _ = h.withdraw("E1", RECEIVER, 100);
    let _ = h.deposit_as(STRANGER, "E1", 1);
    assert_eq!(h.ledger.events().len(), count);

    h.withdraw("E1", RECEIVER, 2).unwrap();
    match &h.ledger.events().last().unwrap().payload {
        EventPayload::Withdrawn(event) => {
            assert_eq!(event.amount, Amount::new(2));
            assert_eq!(event.new_balance, Amount::new(10));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn ledger_from_config_uses_update_timelock() {
    let config = CustodyConfig::testnet();
    let mut ledger = Ledger::from_config(LEDGER, OWNER, GATEWAY, &config);
    let t0 = Timestamp::from_secs(10);
    ledger
        .request_gateway_rotation(&CallContext::new(OWNER, t0), NEXT_GATEWAY)
        .unwrap();
    let pending = ledger.pending_gateway_rotation().unwrap();
    assert_eq!(pending.proposed_value, NEXT_GATEWAY);
    assert_eq!(
        pending.committable_at(&config.update),
        t0.plus_secs(config.update.delay_secs)
    );
}
