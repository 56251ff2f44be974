//! Request and response types moved through the routing pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::privilege::Privilege;

/// Network function byte.
pub type NetFn = u8;
/// Command byte within a network function.
pub type Cmd = u8;
/// Group extension selector carried by group requests.
pub type Group = u8;
/// 24-bit IANA enterprise number carried by OEM requests.
pub type Iana = u32;
/// Logical unit number, echoed unchanged.
pub type Lun = u8;

/// Registration priority; higher values win.
pub type Priority = i32;

/// Standard network functions.
pub mod netfn {
    use super::NetFn;

    /// Chassis commands.
    pub const CHASSIS: NetFn = 0x00;
    /// Bridge commands.
    pub const BRIDGE: NetFn = 0x02;
    /// Sensor and event commands.
    pub const SENSOR: NetFn = 0x04;
    /// Application commands.
    pub const APP: NetFn = 0x06;
    /// Firmware commands.
    pub const FIRMWARE: NetFn = 0x08;
    /// Storage commands.
    pub const STORAGE: NetFn = 0x0A;
    /// Transport commands.
    pub const TRANSPORT: NetFn = 0x0C;
    /// Group extension; the first payload byte selects the group.
    pub const GROUP: NetFn = 0x2C;
    /// OEM/group; the first three payload bytes carry the IANA number.
    pub const OEM: NetFn = 0x2E;
    /// First controller-specific OEM network function.
    pub const OEM_ONE: NetFn = 0x30;
    /// Last controller-specific OEM network function.
    pub const OEM_EIGHT: NetFn = 0x3E;
    /// Bit set on every response network function.
    pub const RESPONSE_BIT: NetFn = 0x01;

    /// Returns `true` for network functions accepted by the standard table.
    #[must_use]
    pub const fn is_valid_request(netfn: NetFn) -> bool {
        netfn & RESPONSE_BIT == 0
            && (netfn <= TRANSPORT || (netfn >= GROUP && netfn <= OEM_EIGHT))
    }

    /// Network function of the response to `netfn`.
    #[must_use]
    pub const fn response(netfn: NetFn) -> NetFn {
        netfn | RESPONSE_BIT
    }
}

/// Defining bodies for the group extension.
pub mod group {
    use super::Group;

    /// PICMG.
    pub const PICMG: Group = 0x00;
    /// DMTF.
    pub const DMTG: Group = 0x01;
    /// Server System Infrastructure forum.
    pub const SSI: Group = 0x02;
    /// VITA Standards Organisation.
    pub const VSO: Group = 0x03;
    /// Data Center Manageability Interface.
    pub const DCMI: Group = 0xDC;
}

/// Well-known registration priorities.
pub mod priority {
    use super::Priority;

    /// Base handlers shipped with the router distribution.
    pub const OPENBMC_BASE: Priority = 10;
    /// OEM overrides.
    pub const OEM_BASE: Priority = 20;
    /// ODM overrides.
    pub const ODM_BASE: Priority = 30;
    /// Site-specific overrides.
    pub const CUSTOM_BASE: Priority = 40;
    /// Highest priority.
    pub const MAX: Priority = 50;
}

/// Command byte that matches every command of a selector.
pub const CMD_WILDCARD: Cmd = 0xFF;

/// Width in bytes of the IANA selector on the wire.
pub const IANA_LEN: usize = 3;

/// Decodes a little-endian 24-bit IANA number.
#[must_use]
pub fn decode_iana(bytes: [u8; IANA_LEN]) -> Iana {
    let [low, mid, high] = bytes;
    u32::from_le_bytes([low, mid, high, 0])
}

/// Encodes an IANA number as the three little-endian wire bytes.
#[must_use]
pub fn encode_iana(iana: Iana) -> [u8; IANA_LEN] {
    let [low, mid, high, _] = iana.to_le_bytes();
    [low, mid, high]
}

/// IPMI completion code.
///
/// Handlers may return any byte; the associated constants name the codes
/// defined by the IPMI 2.0 specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionCode(pub u8);

impl CompletionCode {
    /// Command completed normally.
    pub const SUCCESS: Self = Self(0x00);
    /// Node busy.
    pub const BUSY: Self = Self(0xC0);
    /// Invalid or unsupported command.
    pub const INVALID_COMMAND: Self = Self(0xC1);
    /// Command invalid for the given LUN.
    pub const INVALID_COMMAND_ON_LUN: Self = Self(0xC2);
    /// Timeout while processing.
    pub const TIMEOUT: Self = Self(0xC3);
    /// Out of storage space.
    pub const OUT_OF_SPACE: Self = Self(0xC4);
    /// Reservation cancelled or invalid.
    pub const INVALID_RESERVATION_ID: Self = Self(0xC5);
    /// Request data truncated.
    pub const REQUEST_DATA_TRUNCATED: Self = Self(0xC6);
    /// Request data length invalid.
    pub const REQUEST_DATA_LENGTH_INVALID: Self = Self(0xC7);
    /// Request data field length limit exceeded.
    pub const REQUEST_DATA_LENGTH_EXCEEDED: Self = Self(0xC8);
    /// Parameter out of range.
    pub const PARAMETER_OUT_OF_RANGE: Self = Self(0xC9);
    /// Cannot return the number of requested bytes.
    pub const RETURN_BYTES_UNAVAILABLE: Self = Self(0xCA);
    /// Requested sensor, data or record not present.
    pub const SENSOR_INVALID: Self = Self(0xCB);
    /// Invalid data field in request.
    pub const INVALID_FIELD_REQUEST: Self = Self(0xCC);
    /// Command illegal for the sensor or record type.
    pub const ILLEGAL_COMMAND: Self = Self(0xCD);
    /// Command response could not be provided.
    pub const RESPONSE_ERROR: Self = Self(0xCE);
    /// Duplicated request.
    pub const DUPLICATE_REQUEST: Self = Self(0xCF);
    /// SDR repository in update mode.
    pub const SDR_UPDATE_MODE: Self = Self(0xD0);
    /// Device in firmware update mode.
    pub const FIRMWARE_UPDATE_MODE: Self = Self(0xD1);
    /// Controller initialisation in progress.
    pub const INIT_IN_PROGRESS: Self = Self(0xD2);
    /// Destination unavailable.
    pub const DESTINATION_UNAVAILABLE: Self = Self(0xD3);
    /// Insufficient privilege level.
    pub const INSUFFICIENT_PRIVILEGE: Self = Self(0xD4);
    /// Command not supported in the present state.
    pub const COMMAND_NOT_AVAILABLE: Self = Self(0xD5);
    /// Command sub-function disabled.
    pub const COMMAND_DISABLED: Self = Self(0xD6);
    /// Unspecified error.
    pub const UNSPECIFIED_ERROR: Self = Self(0xFF);

    /// Returns `true` for [`CompletionCode::SUCCESS`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "0x{:02X}", self.0)
    }
}

impl From<u8> for CompletionCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// Handler table a request is routed to, with its selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Standard table keyed by network function.
    Standard(NetFn),
    /// Group table keyed by group selector.
    Group(Group),
    /// OEM table keyed by IANA number.
    Oem(Iana),
}

impl fmt::Display for Route {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(netfn) => write!(formatter, "netfn 0x{netfn:02X}"),
            Self::Group(group) => write!(formatter, "group 0x{group:02X}"),
            Self::Oem(iana) => write!(formatter, "iana {iana}"),
        }
    }
}

/// Per-request metadata established before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Request network function.
    pub netfn: NetFn,
    /// Request command.
    pub cmd: Cmd,
    /// Table and selector the request targets.
    pub route: Route,
    /// Channel the request arrived on.
    pub channel: u8,
    /// Authenticated user; `0` when unknown.
    pub user_id: u8,
    /// Session the request belongs to; `0` when session-less.
    pub session_id: u32,
    /// Effective caller privilege.
    pub privilege: Privilege,
    /// Requestor source address on IPMB channels.
    pub rq_sa: i32,
}

impl RequestContext {
    /// Builds a context for a standard-table request with no credentials.
    #[must_use]
    pub fn new(netfn: NetFn, cmd: Cmd, channel: u8) -> Self {
        Self {
            netfn,
            cmd,
            route: Route::Standard(netfn),
            channel,
            user_id: 0,
            session_id: 0,
            privilege: Privilege::None,
            rq_sa: 0,
        }
    }
}

/// Request handed to filters and handlers.
///
/// For group and OEM requests the payload excludes the selector bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request metadata.
    pub context: RequestContext,
    /// Command payload.
    pub payload: Vec<u8>,
}

impl Request {
    /// Creates a request.
    #[must_use]
    pub fn new(context: RequestContext, payload: Vec<u8>) -> Self {
        Self { context, payload }
    }
}

/// Handler result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Completion code.
    pub cc: CompletionCode,
    /// Response payload.
    pub payload: Vec<u8>,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(cc: CompletionCode, payload: Vec<u8>) -> Self {
        Self { cc, payload }
    }

    /// Successful response carrying `payload`.
    #[must_use]
    pub fn success(payload: Vec<u8>) -> Self {
        Self::new(CompletionCode::SUCCESS, payload)
    }

    /// Empty response with the given completion code.
    #[must_use]
    pub fn error(cc: CompletionCode) -> Self {
        Self::new(cc, Vec::new())
    }

    /// Inserts `prefix` ahead of the payload.
    pub fn prepend(&mut self, prefix: &[u8]) {
        self.payload.splice(0..0, prefix.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::chassis(netfn::CHASSIS, true)]
    #[case::transport(netfn::TRANSPORT, true)]
    #[case::odd(0x07, false)]
    #[case::gap_low(0x0E, false)]
    #[case::gap_high(0x2A, false)]
    #[case::group(netfn::GROUP, true)]
    #[case::oem(netfn::OEM, true)]
    #[case::oem_eight(netfn::OEM_EIGHT, true)]
    #[case::beyond(0x40, false)]
    fn validates_standard_netfns(#[case] value: NetFn, #[case] expected: bool) {
        assert_eq!(netfn::is_valid_request(value), expected);
    }

    #[test]
    fn iana_bytes_are_little_endian() {
        assert_eq!(decode_iana([0x57, 0x01, 0x00]), 0x0157);
        assert_eq!(encode_iana(0x00_A0_15), [0x15, 0xA0, 0x00]);
    }

    #[test]
    fn prepend_keeps_existing_payload() {
        let mut response = Response::success(vec![0xAA, 0xBB]);
        response.prepend(&[0x07]);
        assert_eq!(response.payload, vec![0x07, 0xAA, 0xBB]);
    }

    #[test]
    fn completion_code_displays_as_hex() {
        assert_eq!(CompletionCode::INVALID_COMMAND.to_string(), "0xC1");
        assert!(CompletionCode::SUCCESS.is_success());
        assert!(!CompletionCode(0x80).is_success());
    }
}
