//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tokio::runtime::Builder;
use tokio::task::LocalSet;
use tracing::info;

use ipmid_config::Config;

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, StaticConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::provider::ProviderSet;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
    pub(crate) providers: ProviderSet,
}

/// Runs the daemon with `config` and `providers` until a termination signal
/// arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] if the runtime cannot start, bootstrap fails, or
/// the listener fails while serving.
pub fn run_daemon(config: Config, providers: ProviderSet) -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: StaticConfigLoader::new(config),
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal,
        providers,
    })
}

/// Runs the daemon with injected collaborators on a single-threaded runtime.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        providers,
    } = plan;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;
    let local = LocalSet::new();

    local.block_on(&runtime, async move {
        let daemon = bootstrap_with(&loader, reporter, providers).await?;
        info!(
            target: PROCESS_TARGET,
            socket = %daemon.config().daemon_socket(),
            "daemon runtime started"
        );

        let mut signal_failure = None;
        let drained = daemon
            .serve(async {
                if let Err(error) = shutdown.wait().await {
                    signal_failure = Some(error);
                }
            })
            .await?;
        if let Some(error) = signal_failure {
            return Err(error.into());
        }

        info!(
            target: PROCESS_TARGET,
            handlers = drained.handlers,
            filters = drained.filters,
            "shutdown sequence completed"
        );
        Ok(())
    })
}
