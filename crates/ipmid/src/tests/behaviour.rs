//! Behaviour-driven tests for the daemon bootstrap sequence.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio::runtime::Runtime;

use crate::bootstrap::{
    BootstrapError, ConfigLoader, Daemon, bootstrap_with, bootstrap_with_directory,
};
use crate::provider::ProviderSet;

use super::support::{
    EchoProvider, FailingConfigLoader, HealthEvent, MockDirectory, RecordingHealthReporter,
    TestConfigLoader, unreachable_directory,
};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    loader: Option<Box<dyn ConfigLoader>>,
    directory: Option<MockDirectory>,
    reporter: Arc<RecordingHealthReporter>,
    outcome: Option<Result<Daemon, BootstrapError>>,
    runtime: Option<Runtime>,
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn stage(error: &BootstrapError) -> &'static str {
    match error {
        BootstrapError::Configuration { .. } => "configuration",
        BootstrapError::Telemetry { .. } => "telemetry",
        BootstrapError::Channels { .. } => "channels",
        BootstrapError::Socket { .. } => "socket",
        BootstrapError::Seed { .. } => "seed",
        BootstrapError::Listener { .. } => "listener",
    }
}

fn seeded(world: &TestWorld) -> Vec<usize> {
    world
        .reporter
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HealthEvent::ChannelsSeeded(mapped) => Some(mapped),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a daemon configured to serve on TCP")]
fn given_tcp_daemon(world: &RefCell<TestWorld>) {
    world.borrow_mut().loader = Some(Box::new(TestConfigLoader::tcp()));
}

#[given("a configuration that cannot load")]
fn given_failing_configuration(world: &RefCell<TestWorld>) {
    world.borrow_mut().loader = Some(Box::new(FailingConfigLoader));
}

#[given("a name directory that cannot list names")]
fn given_unreachable_directory(world: &RefCell<TestWorld>) {
    world.borrow_mut().directory = Some(unreachable_directory());
}

#[given("the channel table is missing")]
fn given_missing_channel_table(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    let loader = world.loader.as_ref().expect("loader configured");
    let config = loader.load().expect("test configuration loads");
    std::fs::remove_file(config.channel_config()).expect("remove channel table");
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the daemon bootstraps")]
fn when_bootstraps(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    let loader = world.loader.take().expect("loader configured");
    let directory = world.directory.take();
    let reporter = Arc::clone(&world.reporter);
    let (provider, _dropped) = EchoProvider::new();
    let providers = ProviderSet::new().with(provider);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime");
    let outcome = runtime.block_on(async {
        match directory {
            Some(directory) => {
                bootstrap_with_directory(loader.as_ref(), reporter, providers, |_| {
                    Box::new(directory)
                })
                .await
            }
            None => bootstrap_with(loader.as_ref(), reporter, providers).await,
        }
    });
    world.runtime = Some(runtime);
    world.outcome = Some(outcome);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("bootstrap succeeds")]
fn then_succeeds(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    match world.outcome.as_ref().expect("bootstrap ran") {
        Ok(daemon) => assert!(daemon.local_addr().is_some()),
        Err(error) => panic!("bootstrap failed: {error}"),
    }
    let events = world.reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert_eq!(events.last(), Some(&HealthEvent::BootstrapSucceeded));
}

#[then("bootstrap fails at the \"{expected}\" stage")]
fn then_fails_at(world: &RefCell<TestWorld>, expected: String) {
    let world = world.borrow();
    match world.outcome.as_ref().expect("bootstrap ran") {
        Ok(_) => panic!("bootstrap should fail at the {expected} stage"),
        Err(error) => assert_eq!(stage(error), expected, "unexpected failure: {error}"),
    }
    let events = world.reporter.events();
    assert!(matches!(events.last(), Some(HealthEvent::BootstrapFailed(_))));
    assert!(!events.contains(&HealthEvent::BootstrapSucceeded));
}

#[then("the health reporter saw {count} seeded channel owner")]
fn then_seeded(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(seeded(&world.borrow()), vec![count]);
}

#[then("the health reporter saw no seeded channel owners")]
fn then_nothing_seeded(world: &RefCell<TestWorld>) {
    assert!(seeded(&world.borrow()).is_empty());
}

#[then("the health reporter saw {count} registered handlers")]
fn then_registered(world: &RefCell<TestWorld>, count: usize) {
    let registered = world.borrow().reporter.events().into_iter().find_map(|event| match event {
        HealthEvent::ProvidersRegistered(summary) => Some(summary),
        _ => None,
    });
    let summary = registered.expect("providers registered");
    assert_eq!(summary.providers, 1);
    assert_eq!(summary.handlers, count);
    assert_eq!(summary.rejected, 0);
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 0)]
fn healthy_bootstrap(#[from(world)] world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 1)]
fn listing_failure_is_fatal(#[from(world)] world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 2)]
fn missing_channel_table_is_fatal(#[from(world)] world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/daemon_bootstrap.feature", index = 3)]
fn invalid_configuration_is_fatal(#[from(world)] world: RefCell<TestWorld>) {
    let _ = world;
}
