//! Client message deserialisation.

use serde::Deserialize;

use crate::context::Options;
use crate::message::{Cmd, Lun, NetFn};

use super::errors::ProtocolError;
use super::router::ExecuteRequest;

/// Caller-supplied correlation id, echoed in the reply.
pub type MessageId = u64;

/// One line sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClientMessage {
    /// Execute an IPMI request.
    Execute {
        /// Correlation id.
        id: MessageId,
        /// Connection identity relayed by the bus bridge. Ignored on any
        /// other connection, which is named by the daemon instead.
        #[serde(default)]
        sender: Option<String>,
        /// Request network function.
        netfn: NetFn,
        /// Logical unit.
        #[serde(default)]
        lun: Lun,
        /// Command byte.
        cmd: Cmd,
        /// Request payload.
        #[serde(default)]
        data: Vec<u8>,
        /// Typed request options.
        #[serde(default)]
        options: Options,
    },
    /// Ownership of a well-known name moved between connections.
    NameOwnerChanged {
        /// Correlation id.
        id: MessageId,
        /// Well-known name.
        name: String,
        /// Previous owner, empty when the name was unowned.
        #[serde(default)]
        old_owner: String,
        /// New owner, empty when the name was released.
        #[serde(default)]
        new_owner: String,
    },
}

impl ClientMessage {
    /// Parses one JSONL line. Trailing whitespace, including the delimiter,
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedJsonl`] if the line is empty or does
    /// not describe a client message.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let trimmed = line.trim_ascii_end();
        if trimmed.is_empty() {
            return Err(ProtocolError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(ProtocolError::from_json_error)
    }

    /// Correlation id of the message.
    pub fn id(&self) -> MessageId {
        match self {
            Self::Execute { id, .. } | Self::NameOwnerChanged { id, .. } => *id,
        }
    }
}

/// Converts the wire fields of an execute message into a dispatcher call.
pub(super) fn execute_request(
    sender: String,
    netfn: NetFn,
    lun: Lun,
    cmd: Cmd,
    data: Vec<u8>,
    options: Options,
) -> ExecuteRequest {
    ExecuteRequest {
        sender,
        netfn,
        lun,
        cmd,
        payload: data,
        options,
    }
}
