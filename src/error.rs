// 2.0: the failure taxonomy callers match on. each component has its own error enum
// carrying detail; all of them collapse onto ErrorKind through kind().

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // caller is not registered, not the owner, or not an authorized spender
    Unauthorized,
    InsufficientEntryBalance,
    // the token primitive refused the transfer
    InsufficientAllowanceOrTokenBalance,
    TimelockNotElapsed,
    // proposal outlived its grace window, re-propose
    TimelockExpired,
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InsufficientEntryBalance => "insufficient entry balance",
            ErrorKind::InsufficientAllowanceOrTokenBalance => {
                "insufficient allowance or token balance"
            }
            ErrorKind::TimelockNotElapsed => "timelock not elapsed",
            ErrorKind::TimelockExpired => "timelock expired",
            ErrorKind::InvalidState => "invalid state",
        };
        f.write_str(name)
    }
}
