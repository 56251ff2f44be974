//! Maps bus connections to the IPMI channel they serve.
//!
//! Channel providers claim a well-known name of the form
//! `xyz.openbmc_project.Ipmi.Channel.<channel-name>`. The resolver tracks the
//! unique connection owning each such name and translates it to a channel
//! number through the [`ChannelTable`]. The map changes while requests are in
//! flight; lookups always see the latest state.

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use ipmid_config::ChannelTable;

const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Namespace of well-known names claimed by channel providers.
pub const CHANNEL_PROVIDER_PREFIX: &str = "xyz.openbmc_project.Ipmi.Channel.";

/// Channel used for connections that never claimed a channel name.
pub const INTRA_BMC_CHANNEL_NAME: &str = "INTRABMC";

/// Failure reported by a [`NameDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("name directory query failed: {message}")]
pub struct DirectoryError {
    message: String,
}

impl DirectoryError {
    /// Builds an error carrying `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Enumerates the names present on the bus at startup.
#[async_trait(?Send)]
pub trait NameDirectory {
    /// Lists every well-known name currently owned.
    async fn list_names(&self) -> Result<Vec<String>, DirectoryError>;

    /// Returns the unique connection owning `name`.
    async fn name_owner(&self, name: &str) -> Result<String, DirectoryError>;
}

/// Directory backed by a fixed name-to-owner map.
#[derive(Debug, Clone, Default)]
pub struct StaticNameDirectory {
    owners: HashMap<String, String>,
}

impl StaticNameDirectory {
    /// Builds a directory from `(name, owner)` pairs.
    pub fn new<I, N, O>(owners: I) -> Self
    where
        I: IntoIterator<Item = (N, O)>,
        N: Into<String>,
        O: Into<String>,
    {
        Self {
            owners: owners
                .into_iter()
                .map(|(name, owner)| (name.into(), owner.into()))
                .collect(),
        }
    }
}

#[async_trait(?Send)]
impl NameDirectory for StaticNameDirectory {
    async fn list_names(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.owners.keys().cloned().collect())
    }

    async fn name_owner(&self, name: &str) -> Result<String, DirectoryError> {
        self.owners
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::new(format!("no owner for '{name}'")))
    }
}

/// Connection-to-channel map.
#[derive(Debug)]
pub struct ChannelResolver {
    table: ChannelTable,
    connections: RefCell<HashMap<String, u8>>,
}

impl ChannelResolver {
    /// Creates an empty resolver over `table`.
    #[must_use]
    pub fn new(table: ChannelTable) -> Self {
        Self {
            table,
            connections: RefCell::new(HashMap::new()),
        }
    }

    /// Channel metadata backing the resolver.
    #[must_use]
    pub fn table(&self) -> &ChannelTable {
        &self.table
    }

    /// Resolves the channel of `connection`.
    ///
    /// Unmapped connections fall back to the intra-BMC channel; `None` means
    /// the channel is indeterminate.
    #[must_use]
    pub fn resolve(&self, connection: &str) -> Option<u8> {
        if let Some(channel) = self.connections.borrow().get(connection) {
            return Some(*channel);
        }
        self.table.channel_by_name(INTRA_BMC_CHANNEL_NAME)
    }

    /// Records that `connection` now owns the provider name `name`.
    ///
    /// Returns the mapped channel, or `None` when `name` is not a channel
    /// provider name or names an unknown channel.
    pub fn on_connection_appeared(&self, name: &str, connection: &str) -> Option<u8> {
        let Some(channel_name) = name.strip_prefix(CHANNEL_PROVIDER_PREFIX) else {
            debug!(target: CHANNEL_TARGET, name, "ignoring non-channel name");
            return None;
        };
        let Some(channel) = self.table.channel_by_name(channel_name) else {
            info!(
                target: CHANNEL_TARGET,
                name,
                "failed interface mapping, no such channel name"
            );
            return None;
        };
        self.connections
            .borrow_mut()
            .insert(connection.to_owned(), channel);
        info!(
            target: CHANNEL_TARGET,
            name,
            connection,
            channel,
            "new interface mapping"
        );
        Some(channel)
    }

    /// Forgets `connection`.
    pub fn on_connection_vanished(&self, connection: &str) {
        if let Some(channel) = self.connections.borrow_mut().remove(connection) {
            debug!(target: CHANNEL_TARGET, connection, channel, "interface mapping removed");
        }
    }

    /// Applies a name-owner-changed signal.
    ///
    /// A non-empty unique old owner is forgotten; a non-empty new owner is
    /// mapped to the channel named by `name`.
    pub fn name_owner_changed(&self, name: &str, old_owner: &str, new_owner: &str) {
        if old_owner.starts_with(':') {
            self.on_connection_vanished(old_owner);
        }
        if !new_owner.is_empty() && name.starts_with(CHANNEL_PROVIDER_PREFIX) {
            self.on_connection_appeared(name, new_owner);
        }
    }

    /// Populates the map from the names present at startup.
    ///
    /// Names are visited in sorted order. A failed owner lookup is logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns the [`DirectoryError`] when the names cannot be listed.
    pub async fn seed(&self, directory: &dyn NameDirectory) -> Result<usize, DirectoryError> {
        let mut names = directory.list_names().await?;
        names.sort();

        let mut mapped = 0;
        for name in names
            .iter()
            .filter(|name| name.starts_with(CHANNEL_PROVIDER_PREFIX))
        {
            match directory.name_owner(name).await {
                Ok(owner) => {
                    if self.on_connection_appeared(name, &owner).is_some() {
                        mapped += 1;
                    }
                }
                Err(error) => {
                    warn!(
                        target: CHANNEL_TARGET,
                        name = name.as_str(),
                        %error,
                        "error getting bus owner"
                    );
                }
            }
        }
        Ok(mapped)
    }

    /// Number of mapped connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.borrow().len()
    }

    /// Returns `true` when no connection is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.borrow().is_empty()
    }
}
