//! Log output selection.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the daemon renders tracing events on stderr.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event, for the BMC journal.
    #[default]
    Json,
    /// Single-line text for a console session.
    Compact,
}

impl LogFormat {
    /// Whether ANSI colour may be written. JSON lines never carry escapes.
    #[must_use]
    pub fn allows_ansi(self) -> bool {
        matches!(self, Self::Compact)
    }
}

/// Rejection raised when a [`LogFormat`] name is unknown.
pub type LogFormatParseError = strum::ParseError;
