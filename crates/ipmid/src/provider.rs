//! Startup registration of command providers.
//!
//! A provider is a unit of handlers and filters linked into the daemon. Each
//! one is asked to register exactly once, in name order, before the listener
//! starts. Providers outlive the tables they populate: the daemon drains the
//! registry and the filter chain before dropping them.

use std::fmt;

use tracing::{debug, info, warn};

use crate::filter::{CommandFilter, FilterChain};
use crate::message::{Cmd, Group, Iana, NetFn, Priority};
use crate::privilege::Privilege;
use crate::registry::{CommandHandler, HandlerRegistry, RegistrationError};

const PROVIDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provider");

/// Contributes handlers and filters at startup.
pub trait CommandProvider {
    /// Stable name used to order registration and tag log events.
    fn name(&self) -> &str;

    /// Registers everything the provider serves.
    fn register(&self, registrar: &mut Registrar<'_>);
}

/// Registration surface handed to each [`CommandProvider`].
///
/// Rejected registrations are logged and counted; they never abort startup.
pub struct Registrar<'a> {
    provider: &'a str,
    registry: &'a mut HandlerRegistry,
    filters: &'a mut FilterChain,
    summary: RegistrationSummary,
}

impl<'a> Registrar<'a> {
    fn new(
        provider: &'a str,
        registry: &'a mut HandlerRegistry,
        filters: &'a mut FilterChain,
    ) -> Self {
        Self {
            provider,
            registry,
            filters,
            summary: RegistrationSummary::default(),
        }
    }

    /// Registers a handler in the standard table. Returns `true` on success.
    pub fn register_handler<H>(
        &mut self,
        priority: Priority,
        netfn: NetFn,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> bool
    where
        H: CommandHandler + 'static,
    {
        let result = self
            .registry
            .register_standard(priority, netfn, cmd, privilege, handler);
        self.record(result)
    }

    /// Registers a handler for a group extension. Returns `true` on success.
    pub fn register_group_handler<H>(
        &mut self,
        priority: Priority,
        group: Group,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> bool
    where
        H: CommandHandler + 'static,
    {
        let result = self
            .registry
            .register_group(priority, group, cmd, privilege, handler);
        self.record(result)
    }

    /// Registers a handler for an OEM enterprise number. Returns `true` on
    /// success.
    pub fn register_oem_handler<H>(
        &mut self,
        priority: Priority,
        iana: Iana,
        cmd: Cmd,
        privilege: Privilege,
        handler: H,
    ) -> bool
    where
        H: CommandHandler + 'static,
    {
        let result = self
            .registry
            .register_oem(priority, iana, cmd, privilege, handler);
        self.record(result)
    }

    /// Adds a filter to the chain.
    pub fn register_filter<F>(&mut self, priority: Priority, filter: F)
    where
        F: CommandFilter + 'static,
    {
        self.filters.register(priority, filter);
        self.summary.filters += 1;
    }

    fn record(&mut self, result: Result<(), RegistrationError>) -> bool {
        match result {
            Ok(()) => {
                self.summary.handlers += 1;
                true
            }
            Err(error) => {
                warn!(
                    target: PROVIDER_TARGET,
                    provider = self.provider,
                    %error,
                    "handler registration rejected"
                );
                self.summary.rejected += 1;
                false
            }
        }
    }
}

/// Counts produced by a registration pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSummary {
    /// Providers that ran.
    pub providers: usize,
    /// Handlers accepted.
    pub handlers: usize,
    /// Filters added.
    pub filters: usize,
    /// Handler registrations refused.
    pub rejected: usize,
}

impl RegistrationSummary {
    fn absorb(&mut self, other: Self) {
        self.handlers += other.handlers;
        self.filters += other.filters;
        self.rejected += other.rejected;
    }
}

/// Providers linked into the daemon.
#[derive(Default)]
pub struct ProviderSet {
    providers: Vec<Box<dyn CommandProvider>>,
}

impl ProviderSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider, builder style.
    #[must_use]
    pub fn with<P>(mut self, provider: P) -> Self
    where
        P: CommandProvider + 'static,
    {
        self.push(provider);
        self
    }

    /// Adds a provider.
    pub fn push<P>(&mut self, provider: P)
    where
        P: CommandProvider + 'static,
    {
        self.providers.push(Box::new(provider));
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` when no provider is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Runs every provider's registration in name order.
    pub fn install(
        &mut self,
        registry: &mut HandlerRegistry,
        filters: &mut FilterChain,
    ) -> RegistrationSummary {
        self.providers
            .sort_by(|left, right| left.name().cmp(right.name()));

        let mut summary = RegistrationSummary::default();
        for provider in &self.providers {
            let mut registrar = Registrar::new(provider.name(), registry, filters);
            provider.register(&mut registrar);
            let counts = registrar.summary;
            debug!(
                target: PROVIDER_TARGET,
                provider = provider.name(),
                handlers = counts.handlers,
                filters = counts.filters,
                rejected = counts.rejected,
                "provider registered"
            );
            summary.providers += 1;
            summary.absorb(counts);
        }
        info!(
            target: PROVIDER_TARGET,
            providers = summary.providers,
            handlers = summary.handlers,
            filters = summary.filters,
            rejected = summary.rejected,
            "provider registration complete"
        );
        summary
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.providers.iter().map(|provider| provider.name()))
            .finish()
    }
}
