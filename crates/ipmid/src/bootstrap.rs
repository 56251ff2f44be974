//! Daemon bootstrap orchestration.

use std::future::Future;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use ipmid_config::{ChannelConfigError, ChannelTable, Config, ConfigError, SocketPreparationError};

use crate::channel::{ChannelResolver, DirectoryError, NameDirectory, StaticNameDirectory};
use crate::context::ContextBuilder;
use crate::dispatch::{DispatchConnectionHandler, Dispatcher, Drained};
use crate::filter::FilterChain;
use crate::health::HealthReporter;
use crate::provider::ProviderSet;
use crate::registry::HandlerRegistry;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, SocketListener};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Scheduler turns granted to aborted tasks to release the dispatcher.
const RECLAIM_ATTEMPTS: usize = 64;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any configuration layer is invalid.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load()
    }
}

/// Loader returning an already resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The channel table could not be loaded.
    #[error("failed to load channel table: {source}")]
    Channels {
        /// Underlying channel table error.
        #[source]
        source: ChannelConfigError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The startup owners of channel-provider names could not be listed.
    #[error("failed to enumerate channel providers: {source}")]
    Seed {
        /// Underlying name directory error.
        #[source]
        source: DirectoryError,
    },
    /// The request socket could not be bound.
    #[error("failed to bind daemon socket: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// Errors surfaced while serving or tearing down.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The accept loop failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// A task still held the dispatcher after shutdown. The tables were not
    /// drained and the providers were left alive beneath them.
    #[error("dispatcher still shared after shutdown; teardown skipped")]
    DispatcherShared,
}

/// Result of a successful bootstrap invocation.
///
/// The socket is bound but not yet accepting; [`Daemon::serve`] starts it.
pub struct Daemon {
    config: Config,
    dispatcher: Dispatcher,
    listener: SocketListener,
    providers: ProviderSet,
    telemetry: TelemetryHandle,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Dispatcher populated by the providers.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until `shutdown` resolves, then tears down in order:
    /// the listener and every in-flight task, the handler registry, the
    /// filter chain, and finally the providers.
    ///
    /// Must run inside a [`tokio::task::LocalSet`].
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Listener`] if the accept loop panicked and
    /// [`ServeError::DispatcherShared`] if teardown could not run.
    pub async fn serve<F>(self, shutdown: F) -> Result<Drained, ServeError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            dispatcher,
            listener,
            providers,
            ..
        } = self;
        let dispatcher = Rc::new(dispatcher);
        let handler = Rc::new(DispatchConnectionHandler::new(
            Rc::clone(&dispatcher),
            config.bus_bridge_uid(),
        ));
        let handle = listener.start(handler);

        shutdown.await;
        info!(target: BOOTSTRAP_TARGET, "stopping request listener");
        handle.shutdown();
        let joined = handle.join().await;

        let drained = tear_down(dispatcher, providers).await?;
        joined?;
        Ok(drained)
    }
}

/// Drains the dispatcher tables, then drops the providers.
///
/// When the dispatcher cannot be reclaimed the providers are leaked, so no
/// registered handler outlives the provider state it borrows from.
pub(crate) async fn tear_down(
    dispatcher: Rc<Dispatcher>,
    providers: ProviderSet,
) -> Result<Drained, ServeError> {
    let Some(dispatcher) = reclaim(dispatcher).await else {
        warn!(
            target: BOOTSTRAP_TARGET,
            providers = providers.len(),
            "dispatcher still shared after shutdown; tables not drained"
        );
        std::mem::forget(providers);
        return Err(ServeError::DispatcherShared);
    };
    let drained = dispatcher.teardown();
    drop(providers);
    Ok(drained)
}

async fn reclaim(mut dispatcher: Rc<Dispatcher>) -> Option<Dispatcher> {
    for _ in 0..RECLAIM_ATTEMPTS {
        match Rc::try_unwrap(dispatcher) {
            Ok(owned) => return Some(owned),
            Err(shared) => {
                dispatcher = shared;
                tokio::task::yield_now().await;
            }
        }
    }
    None
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// Startup channel owners come from [`Config::channel_owners`].
///
/// # Errors
///
/// Returns [`BootstrapError`] naming the first stage that failed; the
/// reporter sees the same error.
pub async fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    providers: ProviderSet,
) -> Result<Daemon, BootstrapError> {
    bootstrap_with_directory(loader, reporter, providers, |config| {
        Box::new(StaticNameDirectory::new(config.channel_owners()))
    })
    .await
}

/// Bootstraps the daemon, seeding channel owners from the directory that
/// `directory` builds from the loaded configuration.
///
/// # Errors
///
/// Returns [`BootstrapError`] naming the first stage that failed, including
/// [`BootstrapError::Seed`] when the directory cannot list names.
pub async fn bootstrap_with_directory<D>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    mut providers: ProviderSet,
    directory: D,
) -> Result<Daemon, BootstrapError>
where
    D: FnOnce(&Config) -> Box<dyn NameDirectory>,
{
    reporter.bootstrap_starting();
    let result = assemble(loader, reporter.as_ref(), &mut providers, directory).await;
    match result {
        Ok((config, dispatcher, listener, telemetry)) => {
            reporter.bootstrap_succeeded(&config);
            Ok(Daemon {
                config,
                dispatcher,
                listener,
                providers,
                telemetry,
            })
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

async fn assemble<D>(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    providers: &mut ProviderSet,
    directory: D,
) -> Result<(Config, Dispatcher, SocketListener, TelemetryHandle), BootstrapError>
where
    D: FnOnce(&Config) -> Box<dyn NameDirectory>,
{
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let table = ChannelTable::load(config.channel_config())
        .map_err(|source| BootstrapError::Channels { source })?;
    config
        .daemon_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    info!(
        target: BOOTSTRAP_TARGET,
        channels = table.valid_channels().count(),
        "channel table loaded"
    );

    let channels = ChannelResolver::new(table);
    let directory = directory(&config);
    let mapped = channels
        .seed(directory.as_ref())
        .await
        .map_err(|source| BootstrapError::Seed { source })?;
    reporter.channels_seeded(mapped);

    let mut registry = HandlerRegistry::new();
    let mut filters = FilterChain::new();
    let summary = providers.install(&mut registry, &mut filters);
    reporter.providers_registered(&summary);

    let listener = SocketListener::bind(config.daemon_socket())
        .await
        .map_err(|source| BootstrapError::Listener { source })?;
    let dispatcher = Dispatcher::new(registry, filters, ContextBuilder::new(channels));
    Ok((config, dispatcher, listener, telemetry))
}
