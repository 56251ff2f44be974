//! Ordered privilege levels gating command execution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller privilege level, ordered from least to most capable.
///
/// A handler registered at a given level may be invoked by callers at that
/// level or any higher one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// No access.
    #[default]
    None = 0,
    /// Callback level.
    Callback = 1,
    /// User level.
    User = 2,
    /// Operator level.
    Operator = 3,
    /// Administrator level.
    Admin = 4,
    /// OEM proprietary level.
    Oem = 5,
}

impl Privilege {
    /// Returns `true` when a caller at this level may run a command
    /// requiring `required`.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self >= required
    }
}

impl TryFrom<i64> for Privilege {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Callback),
            2 => Ok(Self::User),
            3 => Ok(Self::Operator),
            4 => Ok(Self::Admin),
            5 => Ok(Self::Oem),
            other => Err(other),
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Callback => "callback",
            Self::User => "user",
            Self::Operator => "operator",
            Self::Admin => "admin",
            Self::Oem => "oem",
        };
        formatter.write_str(name)
    }
}
