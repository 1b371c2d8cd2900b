// custody-ledger: per-entry token accounting over custodied funds.
// the ledger keeps the books, the gateway moves the tokens, both are governed
// by one owner through timelocked changes. deterministic, no I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Address, TokenAddress, EntryId, Amount, Timestamp, CallContext
//   2.x  error.rs: ErrorKind failure taxonomy
//   3.x  timelock.rs: propose / wait / commit / expire state machine
//   4.x  token.rs: delegated-allowance transfer primitive + in-memory tokens
//   5.x  config.rs: timelock margins, token metadata, env presets
//   6.x  access.rs: owner capability and registered callers
//   7.x  events.rs: state transition events for audit
//   8.x  gateway.rs: authorized transfer conduit
//   9.x  ledger.rs: entry balances, totals, gateway rotation
//   10.x clock.rs: timestamp sources
//   11.x logging.rs: tracing subscriber setup

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod timelock;
pub mod token;
pub mod types;

// re exports for convenience
pub use access::*;
pub use clock::*;
pub use error::*;
pub use events::*;
pub use gateway::*;
pub use ledger::*;
pub use timelock::*;
pub use token::*;
pub use types::*;
pub use config::{ConfigError, CustodyConfig, Environment, TokenConfig};
