//! Handler tables for standard, group and OEM commands.
//!
//! Every slot is keyed by a [`Route`] and a command byte. A slot holds exactly
//! one [`HandlerEntry`]; registering into an occupied slot replaces the entry
//! only when the new priority is at least the existing one, so among equal
//! priorities the most recent registration wins.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::message::{CMD_WILDCARD, Cmd, Group, Iana, NetFn, Priority, Request, Response, Route, netfn};
use crate::privilege::Privilege;

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// A command implementation.
///
/// Handlers run on the router's single cooperative thread and may await
/// downstream calls; other requests are serviced while one is suspended.
#[async_trait(?Send)]
pub trait CommandHandler {
    /// Executes the command and produces its completion code and payload.
    async fn invoke(&self, request: Request) -> Response;
}

/// Adapter turning an async closure into a [`CommandHandler`].
pub struct HandlerFn<F> {
    call: F,
}

/// Wraps `call` so it can be registered as a handler.
#[must_use]
pub fn handler_fn<F, Fut>(call: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + 'static,
    Fut: Future<Output = Response> + 'static,
{
    HandlerFn { call }
}

#[async_trait(?Send)]
impl<F, Fut> CommandHandler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + 'static,
    Fut: Future<Output = Response> + 'static,
{
    async fn invoke(&self, request: Request) -> Response {
        (self.call)(request).await
    }
}

/// An occupied registry slot.
pub struct HandlerEntry {
    priority: Priority,
    privilege: Privilege,
    handler: Box<dyn CommandHandler>,
}

impl HandlerEntry {
    /// Priority the entry was registered with.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Minimum caller privilege.
    #[must_use]
    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// The handler itself.
    #[must_use]
    pub fn handler(&self) -> &dyn CommandHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandlerEntry")
            .field("priority", &self.priority)
            .field("privilege", &self.privilege)
            .finish_non_exhaustive()
    }
}

/// Reasons a registration is refused. The registry is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The network function cannot carry standard requests.
    #[error("network function 0x{netfn:02X} is not a valid request network function")]
    InvalidNetFn {
        /// Rejected network function.
        netfn: NetFn,
    },
    /// A higher-priority entry already owns the slot.
    #[error(
        "{route} command 0x{cmd:02X} is held at priority {existing}; priority {requested} cannot replace it"
    )]
    Superseded {
        /// Slot route.
        route: Route,
        /// Slot command.
        cmd: Cmd,
        /// Priority of the entry kept in the slot.
        existing: Priority,
        /// Priority of the refused registration.
        requested: Priority,
    },
}

/// Handler tables covering all three routes.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: HashMap<(Route, Cmd), HandlerEntry>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler in the standard table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidNetFn`] for odd network functions
    /// and those outside `0x00..=0x0C` and `0x2C..=0x3E`, and
    /// [`RegistrationError::Superseded`] when a higher-priority entry owns the
    /// slot.
    pub fn register_standard<H>(
        &mut self,
        priority: Priority,
        netfn: NetFn,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: CommandHandler + 'static,
    {
        if !netfn::is_valid_request(netfn) {
            return Err(RegistrationError::InvalidNetFn { netfn });
        }
        self.register(priority, Route::Standard(netfn), cmd, privilege, handler)
    }

    /// Registers a handler in the group table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Superseded`] when a higher-priority entry
    /// owns the slot.
    pub fn register_group<H>(
        &mut self,
        priority: Priority,
        group: Group,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: CommandHandler + 'static,
    {
        self.register(priority, Route::Group(group), cmd, privilege, handler)
    }

    /// Registers a handler in the OEM table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Superseded`] when a higher-priority entry
    /// owns the slot.
    pub fn register_oem<H>(
        &mut self,
        priority: Priority,
        iana: Iana,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: CommandHandler + 'static,
    {
        self.register(priority, Route::Oem(iana), cmd, privilege, handler)
    }

    fn register<H>(
        &mut self,
        priority: Priority,
        route: Route,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: CommandHandler + 'static,
    {
        if let Some(existing) = self.entries.get(&(route, cmd))
            && existing.priority > priority
        {
            return Err(RegistrationError::Superseded {
                route,
                cmd,
                existing: existing.priority,
                requested: priority,
            });
        }

        let entry = HandlerEntry {
            priority,
            privilege,
            handler: Box::new(handler),
        };
        let replaced = self.entries.insert((route, cmd), entry).is_some();
        debug!(
            target: REGISTRY_TARGET,
            %route,
            cmd,
            priority,
            %privilege,
            replaced,
            "handler registered"
        );
        Ok(())
    }

    /// Finds the entry for `cmd`, falling back to the route's wildcard entry.
    #[must_use]
    pub fn lookup(&self, route: Route, cmd: Cmd) -> Option<&HandlerEntry> {
        self.entries
            .get(&(route, cmd))
            .or_else(|| self.entries.get(&(route, CMD_WILDCARD)))
    }

    /// Removes the entry stored under exactly `(route, cmd)`.
    pub fn unregister(&mut self, route: Route, cmd: Cmd) -> Option<HandlerEntry> {
        self.entries.remove(&(route, cmd))
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!(target: REGISTRY_TARGET, count, "handler registry cleared");
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests;
