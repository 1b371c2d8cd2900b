//! Custody ledger simulation.
//!
//! Walks the ledger and gateway through deposits, withdrawals, rejected calls,
//! and timelocked gateway rotation against in-memory tokens and a hand-driven clock.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use custody_ledger::*;

type SimResult = Result<(), Box<dyn Error>>;

const OWNER: Address = Address(1);
const LEDGER: Address = Address(10);
const GATEWAY: Address = Address(20);
const NEXT_GATEWAY: Address = Address(21);
const CALLER: Address = Address(30);
const HOLDER: Address = Address(40);
const RECEIVER: Address = Address(50);
const STRANGER: Address = Address(60);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Development,
    Testnet,
    Mainnet,
}

impl From<Preset> for Environment {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Development => Environment::Development,
            Preset::Testnet => Environment::Testnet,
            Preset::Mainnet => Environment::Mainnet,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "custody-sim", about = "Runs custody ledger scenarios end to end")]
struct Args {
    /// Configuration preset
    #[arg(long, value_enum, default_value = "testnet")]
    env: Preset,

    /// TOML config file, overrides the preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

// everything one scenario needs, freshly wired
struct World {
    config: CustodyConfig,
    clock: ManualClock,
    tokens: InMemoryTokens,
    gateway: TransferGateway,
    ledger: Ledger,
    token: TokenConfig,
}

impl World {
    fn new(config: &CustodyConfig) -> Result<Self, Box<dyn Error>> {
        let token = config
            .tokens
            .first()
            .cloned()
            .ok_or("config lists no tokens")?;
        let clock = ManualClock::new(Timestamp::from_secs(1_700_000_000));

        let mut gateway = TransferGateway::new(GATEWAY, OWNER, config.access, config.max_events);
        let mut ledger = Ledger::from_config(LEDGER, OWNER, GATEWAY, config);

        // the ledger becomes a spender on the gateway
        gateway.request_authorization(&CallContext::at(OWNER, &clock), LEDGER)?;
        clock.advance(config.access.delay_secs);
        gateway.confirm_authorization(&CallContext::at(OWNER, &clock), LEDGER)?;

        ledger.grant(&CallContext::at(OWNER, &clock), CALLER)?;

        let mut tokens = InMemoryTokens::new();
        tokens.mint(token.address, HOLDER, Amount::new(1_000 * 10u128.pow(token.decimals)))?;
        tokens.approve(token.address, HOLDER, GATEWAY, Amount::MAX);
        tokens.approve(token.address, LEDGER, GATEWAY, Amount::MAX);

        Ok(Self {
            config: config.clone(),
            clock,
            tokens,
            gateway,
            ledger,
            token,
        })
    }

    fn units(&self, whole: u128) -> Amount {
        Amount::new(whole * 10u128.pow(self.token.decimals))
    }

    fn show(&self, amount: Amount) -> String {
        match amount.to_units(self.token.decimals) {
            Some(units) => format!("{} {}", units.normalize(), self.token.symbol),
            None => format!("{} base units", amount),
        }
    }

    fn deposit(&mut self, caller: Address, entry: EntryId, amount: Amount) -> Result<Amount, LedgerError> {
        let ctx = CallContext::at(caller, &self.clock);
        self.ledger
            .deposit_to_entry(&ctx, &mut self.gateway, &mut self.tokens, entry, self.token.address, HOLDER, amount)
    }

    fn withdraw(&mut self, entry: EntryId, to: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let ctx = CallContext::at(CALLER, &self.clock);
        self.ledger
            .withdraw_from_entry(&ctx, &mut self.gateway, &mut self.tokens, entry, self.token.address, to, amount)
    }

    fn report(&self) {
        for (entry, balance) in self.ledger.entries_for(self.token.address) {
            println!("    {:<4} {}", entry.to_string(), self.show(balance));
        }
        println!(
            "    total {}, custodied {}",
            self.show(self.ledger.total_balance_of(self.token.address)),
            self.show(self.tokens.balance_of(self.token.address, LEDGER)),
        );
    }
}

fn entry(name: &str) -> Result<EntryId, Box<dyn Error>> {
    EntryId::from_name(name).ok_or_else(|| format!("entry name {name:?} too long").into())
}

fn main() -> SimResult {
    let args = Args::parse();
    logging::init(&args.log);

    let config = match &args.config {
        Some(path) => CustodyConfig::load(path)?,
        None => Environment::from(args.env).config(),
    };
    config.validate()?;

    println!("Custody Ledger Simulation");
    println!(
        "access timelock {}s + {}s window, update timelock {}s + {}s window\n",
        config.access.delay_secs,
        config.access.grace_window_secs,
        config.update.delay_secs,
        config.update.grace_window_secs,
    );

    scenario_1_single_deposit(&config)?;
    scenario_2_two_entries(&config)?;
    scenario_3_round_trip(&config)?;
    scenario_4_overdraw(&config)?;
    scenario_5_unregistered_caller(&config)?;
    scenario_6_gateway_rotation(&config)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// A registered caller deposits into one entry.
fn scenario_1_single_deposit(config: &CustodyConfig) -> SimResult {
    println!("Scenario 1: Single Deposit\n");
    let mut world = World::new(config)?;
    let amount = world.units(12);

    world.deposit(CALLER, entry("E1")?, amount)?;
    println!("  Caller deposits {} from holder into E1", world.show(amount));
    world.report();
    println!();
    Ok(())
}

/// Two entries share one token total.
fn scenario_2_two_entries(config: &CustodyConfig) -> SimResult {
    println!("Scenario 2: Two Entries\n");
    let mut world = World::new(config)?;
    let (twelve, twenty_four) = (world.units(12), world.units(24));

    world.deposit(CALLER, entry("E1")?, twelve)?;
    world.deposit(CALLER, entry("E2")?, twenty_four)?;
    world.report();
    world.ledger.check_invariants()?;
    println!("  Entry sum matches total\n");
    Ok(())
}

/// Deposit then withdraw everything to a receiver.
fn scenario_3_round_trip(config: &CustodyConfig) -> SimResult {
    println!("Scenario 3: Deposit and Withdraw\n");
    let mut world = World::new(config)?;
    let amount = world.units(12);
    let token = world.token.address;

    world.deposit(CALLER, entry("E1")?, amount)?;
    let before = world.tokens.balance_of(token, RECEIVER);
    world.withdraw(entry("E1")?, RECEIVER, amount)?;
    let received = world.tokens.balance_of(token, RECEIVER).saturating_sub(before);

    println!("  Receiver got {}", world.show(received));
    world.report();
    println!();
    Ok(())
}

/// Withdrawing more than an entry holds is refused and changes nothing.
fn scenario_4_overdraw(config: &CustodyConfig) -> SimResult {
    println!("Scenario 4: Overdraw Rejected\n");
    let mut world = World::new(config)?;
    let amount = world.units(12);

    world.deposit(CALLER, entry("E1")?, amount)?;
    match world.withdraw(entry("E1")?, RECEIVER, world.units(13)) {
        Err(e) => println!("  Rejected ({}): {}", e.kind(), e),
        Ok(_) => return Err("overdraw was accepted".into()),
    }
    world.report();
    println!();
    Ok(())
}

/// Callers outside the access list cannot touch balances.
fn scenario_5_unregistered_caller(config: &CustodyConfig) -> SimResult {
    println!("Scenario 5: Unregistered Caller\n");
    let mut world = World::new(config)?;
    let amount = world.units(5);

    match world.deposit(STRANGER, entry("E1")?, amount) {
        Err(e) => println!("  Rejected ({}): {}", e.kind(), e),
        Ok(_) => return Err("stranger deposit was accepted".into()),
    }
    world.report();
    println!();
    Ok(())
}

/// Gateway rotation has to wait out the update delay and expires if left too long.
fn scenario_6_gateway_rotation(config: &CustodyConfig) -> SimResult {
    println!("Scenario 6: Gateway Rotation\n");
    let mut world = World::new(config)?;
    let delay = world.config.update.delay_secs;
    let window = world.config.update.grace_window_secs;

    let committable_at = world
        .ledger
        .request_gateway_rotation(&CallContext::at(OWNER, &world.clock), NEXT_GATEWAY)?;
    println!("  Rotation to {} proposed, committable at {}", NEXT_GATEWAY, committable_at);

    if delay > 0 {
        world.clock.advance(delay - 1);
        if let Err(e) = world.ledger.confirm_gateway_rotation(&CallContext::at(OWNER, &world.clock)) {
            println!("  One second early ({}): {}", e.kind(), e);
        }
        world.clock.advance(1);
    }
    let current = world
        .ledger
        .confirm_gateway_rotation(&CallContext::at(OWNER, &world.clock))?;
    println!("  Confirmed on time, gateway is now {}", current);

    world
        .ledger
        .request_gateway_rotation(&CallContext::at(OWNER, &world.clock), GATEWAY)?;
    world.clock.advance(delay + window + 1);
    match world.ledger.confirm_gateway_rotation(&CallContext::at(OWNER, &world.clock)) {
        Err(e) => println!("  Left past its window ({}): {}", e.kind(), e),
        Ok(_) => return Err("expired rotation was accepted".into()),
    }
    println!("  Gateway stays {}", world.ledger.gateway_address());
    Ok(())
}
