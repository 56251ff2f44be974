//! Test harness utilities for the daemon bootstrap and socket suites.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Mutex;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use mockall::mock;
use tempfile::TempDir;

use ipmid_config::{Config, ConfigError, SocketEndpoint};

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::channel::{CHANNEL_PROVIDER_PREFIX, DirectoryError, NameDirectory};
use crate::health::HealthReporter;
use crate::message::{Request, Response, netfn, priority};
use crate::privilege::Privilege;
use crate::provider::{CommandProvider, Registrar, RegistrationSummary};
use crate::registry::handler_fn;

/// Connection identity the system interface bridge claims at startup.
pub const SYSTEM_BRIDGE: &str = ":1.10";

/// Channel table with a session-less system interface on channel 15 and a
/// LAN channel on 1.
pub const CHANNEL_CONFIG: &str = r#"{
    "1": {
        "name": "eth0",
        "is_valid": true,
        "channel_info": {
            "medium_type": "lan-802.3",
            "protocol_type": "ipmb-1.0",
            "session_supported": "multi-session",
            "is_ipmi": true
        }
    },
    "15": {
        "name": "kcs",
        "is_valid": true,
        "channel_info": {
            "medium_type": "system-interface",
            "protocol_type": "kcs",
            "session_supported": "session-less",
            "is_ipmi": true
        }
    }
}"#;

/// Loader backed by a temporary directory holding the channel table and,
/// for Unix endpoints, the socket.
pub struct TestConfigLoader {
    dir: TempDir,
    endpoint: SocketEndpoint,
    bridge_uid: Option<u32>,
}

impl TestConfigLoader {
    /// Serves on a Unix socket inside the temporary directory. The test
    /// process itself is trusted as the bus bridge.
    #[cfg(unix)]
    #[must_use]
    pub fn unix() -> Self {
        use std::os::unix::fs::MetadataExt;

        let dir = TempDir::new().expect("failed to create temporary directory");
        let socket = utf8(&dir).join("ipmid.sock");
        let uid = std::fs::metadata(dir.path())
            .expect("temporary directory metadata")
            .uid();
        let mut loader = Self::with_endpoint(dir, SocketEndpoint::unix(socket));
        loader.bridge_uid = Some(uid);
        loader
    }

    /// Serves on an ephemeral loopback TCP port.
    #[must_use]
    pub fn tcp() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory");
        Self::with_endpoint(dir, SocketEndpoint::tcp("127.0.0.1", 0))
    }

    fn with_endpoint(dir: TempDir, endpoint: SocketEndpoint) -> Self {
        std::fs::write(dir.path().join("channel_config.json"), CHANNEL_CONFIG)
            .expect("write channel table");
        Self {
            dir,
            endpoint,
            bridge_uid: None,
        }
    }

    /// Path of the Unix socket, when one is configured.
    pub fn socket_path(&self) -> Option<Utf8PathBuf> {
        self.endpoint.unix_path().map(Utf8PathBuf::from)
    }

    /// Configuration handed to bootstrap.
    pub fn config(&self) -> Config {
        Config {
            daemon_socket: self.endpoint.clone(),
            channel_config: utf8(&self.dir).join("channel_config.json"),
            channel_owners: vec![format!("{CHANNEL_PROVIDER_PREFIX}kcs={SYSTEM_BRIDGE}")],
            bus_bridge_uid: self.bridge_uid,
            ..Config::default()
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config())
    }
}

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temporary path was not UTF-8")
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load_from_iter(["ipmid", "--daemon-socket", "invalid://socket"])
    }
}

mock! {
    /// Name directory with scripted answers.
    pub Directory {}

    #[async_trait(?Send)]
    impl NameDirectory for Directory {
        async fn list_names(&self) -> Result<Vec<String>, DirectoryError>;
        async fn name_owner(&self, name: &str) -> Result<String, DirectoryError>;
    }
}

/// Directory whose listing fails and which must never be asked for owners.
pub fn unreachable_directory() -> MockDirectory {
    let mut directory = MockDirectory::new();
    directory
        .expect_list_names()
        .once()
        .returning(|| Err(DirectoryError::new("bus unavailable")));
    directory.expect_name_owner().never();
    directory
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn providers_registered(&self, summary: &RegistrationSummary) {
        self.record(HealthEvent::ProvidersRegistered(*summary));
    }

    fn channels_seeded(&self, mapped: usize) {
        self.record(HealthEvent::ChannelsSeeded(mapped));
    }
}

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// Providers finished registering.
    ProvidersRegistered(RegistrationSummary),
    /// Startup channel enumeration mapped this many connections.
    ChannelsSeeded(usize),
}

/// Provider serving an echo command and an operator-only command on the
/// application NetFn. Flags `dropped` when released.
pub struct EchoProvider {
    dropped: Rc<Cell<bool>>,
}

/// Command echoing its payload.
pub const ECHO_CMD: u8 = 0x01;
/// Command reserved for operators.
pub const OPERATOR_CMD: u8 = 0x02;

impl EchoProvider {
    /// Builds the provider and the flag it sets on drop.
    pub fn new() -> (Self, Rc<Cell<bool>>) {
        let dropped = Rc::new(Cell::new(false));
        (
            Self {
                dropped: Rc::clone(&dropped),
            },
            dropped,
        )
    }
}

impl CommandProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn register(&self, registrar: &mut Registrar<'_>) {
        registrar.register_handler(
            priority::OPENBMC_BASE,
            netfn::APP,
            ECHO_CMD,
            Privilege::User,
            handler_fn(|request: Request| async move { Response::success(request.payload) }),
        );
        registrar.register_handler(
            priority::OPENBMC_BASE,
            netfn::APP,
            OPERATOR_CMD,
            Privilege::Operator,
            handler_fn(|_request: Request| async { Response::success(vec![0x01]) }),
        );
    }
}

impl Drop for EchoProvider {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}
