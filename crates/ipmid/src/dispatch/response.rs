//! Daemon message serialisation.

use serde::Serialize;

use crate::message::{Cmd, CompletionCode, Lun, NetFn};

use super::errors::ProtocolError;
use super::request::MessageId;
use super::router::ExecuteResponse;

/// One line sent by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Outcome of an execute message.
    Response {
        /// Correlation id copied from the request.
        id: MessageId,
        /// Response network function.
        netfn: NetFn,
        /// Echoed logical unit.
        lun: Lun,
        /// Echoed command.
        cmd: Cmd,
        /// Completion code.
        cc: CompletionCode,
        /// Response payload.
        data: Vec<u8>,
    },
    /// Acknowledges a name-owner-changed message.
    Ack {
        /// Correlation id copied from the request.
        id: MessageId,
    },
    /// The preceding line could not be understood.
    Error {
        /// Human-readable diagnostic.
        message: String,
    },
}

impl DaemonMessage {
    /// Wraps a dispatcher result.
    pub fn response(id: MessageId, response: ExecuteResponse) -> Self {
        Self::Response {
            id,
            netfn: response.netfn,
            lun: response.lun,
            cmd: response.cmd,
            cc: response.cc,
            data: response.payload,
        }
    }

    /// Creates an error report from a protocol failure.
    pub fn error(error: &ProtocolError) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }

    /// Serialises the message as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Serialize`] if serialisation fails.
    pub fn to_line(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut line = serde_json::to_vec(self).map_err(ProtocolError::Serialize)?;
        line.push(b'\n');
        Ok(line)
    }
}
