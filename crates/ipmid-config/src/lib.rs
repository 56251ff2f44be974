//! Configuration for the IPMI command router daemon.
//!
//! [`Config`] is layered by `ortho_config`, lowest precedence first:
//! built-in defaults, a TOML file named by `--config-path` or
//! `IPMID_CONFIG_PATH`, `IPMID_*` environment variables, and command-line
//! flags. The crate also owns the [`ChannelTable`] read from
//! `channel_config.json`, which describes the medium and session capabilities
//! of every channel the router serves.

mod channel;
mod defaults;
mod logging;
mod socket;

use std::ffi::OsString;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use channel::{
    ChannelConfigError, ChannelInfo, ChannelProperties, ChannelTable, DEFAULT_CHANNEL_NAME,
    MAX_CHANNELS, MediumType, ProtocolType, SessionSupport,
};
pub use defaults::{
    DEFAULT_CHANNEL_CONFIG_PATH, DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT, default_channel_config,
    default_log_filter, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Key under which startup channel owners are configured.
pub const CHANNEL_OWNERS_KEY: &str = "channel_owners";

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "IPMID")]
pub struct Config {
    /// Endpoint the daemon listens on for requests.
    #[serde(default = "defaults::default_socket_endpoint")]
    pub daemon_socket: SocketEndpoint,
    /// Tracing filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Location of the channel table.
    #[serde(default = "defaults::default_channel_config")]
    pub channel_config: Utf8PathBuf,
    /// Provider names already owned at startup, each written
    /// `<well-known name>=<unique connection>`.
    #[serde(default)]
    #[ortho_config(merge_strategy = "append")]
    pub channel_owners: Vec<String>,
    /// Unix user id of the bus bridge. Only Unix-socket peers running as
    /// this user may name their own sender or relay name-owner-changed
    /// signals; `None` trusts no peer.
    #[serde(default)]
    pub bus_bridge_uid: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            channel_config: default_channel_config(),
            channel_owners: Vec::new(),
            bus_bridge_uid: None,
        }
    }
}

/// Errors raised while assembling the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration layer failed to parse or merge.
    #[error(transparent)]
    Load(#[from] Arc<OrthoError>),
    /// A merged value is syntactically valid but unusable.
    #[error("invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Diagnostic.
        message: String,
    },
}

impl ConfigError {
    fn invalid_value(key: &'static str, value: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_owned(),
            message: message.into(),
        }
    }

    /// The layering error, when loading failed inside `ortho_config`.
    #[must_use]
    pub fn ortho(&self) -> Option<&OrthoError> {
        match self {
            Self::Load(error) => Some(error.as_ref()),
            Self::InvalidValue { .. } => None,
        }
    }

    /// The command-line parse failure, including `--help` and `--version`
    /// requests, when one caused this error.
    #[must_use]
    pub fn cli(&self) -> Option<&clap::Error> {
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            Some(self.ortho()? as &(dyn std::error::Error + 'static));
        while let Some(error) = current {
            if let Some(cli) = error.downcast_ref::<clap::Error>() {
                return Some(cli);
            }
            current = error.source();
        }
        None
    }
}

impl Config {
    /// Loads the configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer fails to parse or a merged value
    /// is unusable.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads the configuration from explicit arguments and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer fails to parse or a merged value
    /// is unusable.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = <Self as OrthoConfig>::load_from_iter(args)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.channel_owners {
            if split_owner(entry).is_none() {
                return Err(ConfigError::invalid_value(
                    CHANNEL_OWNERS_KEY,
                    entry,
                    "expected '<well-known name>=<connection>'",
                ));
            }
        }
        Ok(())
    }

    /// Endpoint the daemon listens on.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Location of the channel table.
    #[must_use]
    pub fn channel_config(&self) -> &Utf8Path {
        &self.channel_config
    }

    /// Startup owners of channel-provider names as `(name, connection)`.
    ///
    /// Malformed entries are skipped; [`Config::load`] rejects them.
    pub fn channel_owners(&self) -> impl Iterator<Item = (&str, &str)> {
        self.channel_owners.iter().filter_map(|entry| split_owner(entry))
    }

    /// Peer user id trusted as the bus bridge.
    #[must_use]
    pub fn bus_bridge_uid(&self) -> Option<u32> {
        self.bus_bridge_uid
    }
}

fn split_owner(entry: &str) -> Option<(&str, &str)> {
    let (name, owner) = entry.split_once('=')?;
    let (name, owner) = (name.trim(), owner.trim());
    (!name.is_empty() && !owner.is_empty()).then_some((name, owner))
}
