//! Channel table describing the IPMI channels exposed by the controller.
//!
//! The table is loaded from `channel_config.json`, a JSON object keyed by the
//! channel number (`"0"` through `"15"`). Each entry names the channel and
//! records its medium, protocol, and session capabilities. Channels missing
//! from the file are filled with reserved defaults so lookups by number never
//! fail.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Number of configurable IPMI channels.
pub const MAX_CHANNELS: u8 = 16;

/// Name assigned to channels that the configuration leaves unset.
pub const DEFAULT_CHANNEL_NAME: &str = "RESERVED";

const SMALL_CHANNEL_SIZE: usize = 64;

/// Channel medium type (IPMI 2.0 table 6-3).
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
pub enum MediumType {
    /// Reserved or unconfigured medium.
    #[default]
    #[serde(rename = "reserved")]
    #[strum(serialize = "reserved")]
    Reserved,
    /// Intelligent Platform Management Bus.
    #[serde(rename = "ipmb")]
    #[strum(serialize = "ipmb")]
    Ipmb,
    /// ICMB v1.0.
    #[serde(rename = "icmb-v1.0")]
    #[strum(serialize = "icmb-v1.0")]
    IcmbV10,
    /// ICMB v0.9.
    #[serde(rename = "icmb-v0.9")]
    #[strum(serialize = "icmb-v0.9")]
    IcmbV09,
    /// 802.3 LAN.
    #[serde(rename = "lan-802.3")]
    #[strum(serialize = "lan-802.3")]
    Lan8032,
    /// Asynchronous serial or modem.
    #[serde(rename = "serial")]
    #[strum(serialize = "serial")]
    Serial,
    /// Other LAN.
    #[serde(rename = "other-lan")]
    #[strum(serialize = "other-lan")]
    OtherLan,
    /// PCI `SMBus`.
    #[serde(rename = "pci-smbus")]
    #[strum(serialize = "pci-smbus")]
    PciSmbus,
    /// `SMBus` v1.0/1.1.
    #[serde(rename = "smbus-v1.0")]
    #[strum(serialize = "smbus-v1.0")]
    SmbusV11,
    /// `SMBus` v2.0.
    #[serde(rename = "smbus-v2.0")]
    #[strum(serialize = "smbus-v2.0")]
    SmbusV20,
    /// USB 1.x.
    #[serde(rename = "usb-1x")]
    #[strum(serialize = "usb-1x")]
    UsbV1x,
    /// USB 2.x.
    #[serde(rename = "usb-2x")]
    #[strum(serialize = "usb-2x")]
    UsbV2x,
    /// System interface (KCS, SMIC, BT).
    #[serde(rename = "system-interface")]
    #[strum(serialize = "system-interface")]
    SystemInterface,
    /// OEM medium.
    #[serde(rename = "oem")]
    #[strum(serialize = "oem")]
    Oem,
    /// Medium could not be classified.
    #[serde(rename = "unknown")]
    #[strum(serialize = "unknown")]
    Unknown,
}

/// Channel protocol type (IPMI 2.0 table 6-2).
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
pub enum ProtocolType {
    /// Not applicable.
    #[serde(rename = "na")]
    #[strum(serialize = "na")]
    Na,
    /// IPMB 1.0.
    #[serde(rename = "ipmb-1.0")]
    #[strum(serialize = "ipmb-1.0")]
    IpmbV10,
    /// ICMB 1.0.
    #[serde(rename = "icmb-2.0")]
    #[strum(serialize = "icmb-2.0")]
    IcmbV11,
    /// Reserved.
    #[default]
    #[serde(rename = "reserved")]
    #[strum(serialize = "reserved")]
    Reserved,
    /// IPMI on `SMBus`.
    #[serde(rename = "ipmi-smbus")]
    #[strum(serialize = "ipmi-smbus")]
    IpmiSmbus,
    /// Keyboard controller style.
    #[serde(rename = "kcs")]
    #[strum(serialize = "kcs")]
    Kcs,
    /// Server management interface chip.
    #[serde(rename = "smic")]
    #[strum(serialize = "smic")]
    Smic,
    /// Block transfer, IPMI v1.0.
    #[serde(rename = "bt-10")]
    #[strum(serialize = "bt-10")]
    Bt10,
    /// Block transfer, IPMI v1.5.
    #[serde(rename = "bt-15")]
    #[strum(serialize = "bt-15")]
    Bt15,
    /// Terminal mode.
    #[serde(rename = "tmode")]
    #[strum(serialize = "tmode")]
    TMode,
    /// OEM protocol.
    #[serde(rename = "oem")]
    #[strum(serialize = "oem")]
    Oem,
}

/// Session capability of a channel.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
pub enum SessionSupport {
    /// Requests arrive without any session.
    #[default]
    #[serde(rename = "session-less")]
    #[strum(serialize = "session-less")]
    SessionLess,
    /// A single session at a time.
    #[serde(rename = "single-session")]
    #[strum(serialize = "single-session")]
    SingleSession,
    /// Multiple concurrent sessions.
    #[serde(rename = "multi-session")]
    #[strum(serialize = "multi-session")]
    MultiSession,
    /// Session-based, any number of sessions.
    #[serde(rename = "session-based")]
    #[strum(serialize = "session-based")]
    SessionBased,
}

impl SessionSupport {
    /// Returns `true` when requests on the channel carry session credentials.
    #[must_use]
    pub const fn has_sessions(self) -> bool {
        !matches!(self, Self::SessionLess)
    }
}

/// Medium, protocol and session description of a channel.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Physical or virtual medium.
    pub medium_type: MediumType,
    /// Message protocol spoken on the medium.
    pub protocol_type: ProtocolType,
    /// Session capability.
    pub session_supported: SessionSupport,
    /// Whether the channel carries IPMI messaging.
    pub is_ipmi: bool,
}

/// A single configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelProperties {
    /// Channel name used by providers to claim it.
    pub name: String,
    /// Channel number.
    pub number: u8,
    /// Whether the channel is enabled.
    pub is_valid: bool,
    /// Sessions currently active on the channel.
    pub active_sessions: u8,
    /// Largest message the channel can carry.
    pub max_transfer_size: usize,
    /// Medium and protocol description.
    pub info: ChannelInfo,
}

impl ChannelProperties {
    /// Builds a valid channel with the given name and description.
    #[must_use]
    pub fn new(number: u8, name: impl Into<String>, info: ChannelInfo) -> Self {
        Self {
            name: name.into(),
            number,
            is_valid: true,
            active_sessions: 0,
            max_transfer_size: SMALL_CHANNEL_SIZE,
            info,
        }
    }

    fn reserved(number: u8) -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_owned(),
            number,
            is_valid: false,
            active_sessions: 0,
            max_transfer_size: SMALL_CHANNEL_SIZE,
            info: ChannelInfo::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    name: String,
    is_valid: bool,
    #[serde(default)]
    active_sessions: u8,
    #[serde(default = "small_channel_size")]
    max_transfer_size: usize,
    channel_info: ChannelInfo,
}

fn small_channel_size() -> usize {
    SMALL_CHANNEL_SIZE
}

/// Errors raised while loading the channel table.
#[derive(Debug, Error)]
pub enum ChannelConfigError {
    /// The file could not be read.
    #[error("failed to read channel config '{path}': {source}")]
    Read {
        /// Path of the channel table.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file contents did not match the channel table schema.
    #[error("invalid channel config: {source}")]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Lookup table of all configurable channels, indexed by channel number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTable {
    channels: Vec<ChannelProperties>,
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self {
            channels: (0..MAX_CHANNELS).map(ChannelProperties::reserved).collect(),
        }
    }
}

impl ChannelTable {
    /// Reads the channel table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigError`] when the file is unreadable or malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, ChannelConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ChannelConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses the channel table from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigError::Parse`] when the text does not match the
    /// schema or names an unknown medium, protocol, or session type.
    pub fn from_json_str(text: &str) -> Result<Self, ChannelConfigError> {
        let mut raw: BTreeMap<String, Option<RawChannel>> =
            serde_json::from_str(text).map_err(|source| ChannelConfigError::Parse { source })?;
        let mut table = Self::default();
        for number in 0..MAX_CHANNELS {
            let Some(Some(entry)) = raw.remove(&number.to_string()) else {
                continue;
            };
            table = table.with_channel(ChannelProperties {
                name: entry.name,
                number,
                is_valid: entry.is_valid,
                active_sessions: entry.active_sessions,
                max_transfer_size: entry.max_transfer_size,
                info: entry.channel_info,
            });
        }
        Ok(table)
    }

    /// Replaces the entry for `channel.number`; out-of-range numbers are ignored.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelProperties) -> Self {
        if let Some(slot) = self.channels.get_mut(usize::from(channel.number)) {
            *slot = channel;
        }
        self
    }

    /// Returns the channel with the given number.
    #[must_use]
    pub fn get(&self, number: u8) -> Option<&ChannelProperties> {
        self.channels.get(usize::from(number))
    }

    /// Finds the channel number registered under `name`.
    #[must_use]
    pub fn channel_by_name(&self, name: &str) -> Option<u8> {
        self.channels
            .iter()
            .find(|channel| channel.name == name)
            .map(|channel| channel.number)
    }

    /// Session capability of a channel; unknown channels are session-less.
    #[must_use]
    pub fn session_support(&self, number: u8) -> SessionSupport {
        self.get(number)
            .map(|channel| channel.info.session_supported)
            .unwrap_or_default()
    }

    /// Medium type of a channel; unknown channels report a reserved medium.
    #[must_use]
    pub fn medium_type(&self, number: u8) -> MediumType {
        self.get(number)
            .map(|channel| channel.info.medium_type)
            .unwrap_or_default()
    }

    /// Iterates over every channel marked valid.
    pub fn valid_channels(&self) -> impl Iterator<Item = &ChannelProperties> {
        self.channels.iter().filter(|channel| channel.is_valid)
    }
}
