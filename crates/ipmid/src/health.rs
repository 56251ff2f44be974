//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use ipmid_config::Config;

use crate::bootstrap::BootstrapError;
use crate::provider::RegistrationSummary;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once every provider has registered.
    fn providers_registered(&self, summary: &RegistrationSummary);

    /// Invoked after the startup channel enumeration.
    fn channels_seeded(&self, mapped: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn providers_registered(&self, summary: &RegistrationSummary) {
        (**self).providers_registered(summary);
    }

    fn channels_seeded(&self, mapped: usize) {
        (**self).channels_seeded(mapped);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            channel_config = %config.channel_config(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn providers_registered(&self, summary: &RegistrationSummary) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "providers_registered",
            providers = summary.providers,
            handlers = summary.handlers,
            filters = summary.filters,
            rejected = summary.rejected,
            "command providers registered"
        );
    }

    fn channels_seeded(&self, mapped: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "channels_seeded",
            mapped,
            "channel map seeded"
        );
    }
}
