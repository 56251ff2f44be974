//! Fail-fast behaviour when configuration layers carry bad values.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoError;
use tempfile::TempDir;

use ipmid_config::{CHANNEL_OWNERS_KEY, Config, ConfigError};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = std::env::var_os(key);
        // SAFETY: serialised by ENV_MUTEX for the lifetime of the override.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        // SAFETY: the mutex guard is still held here.
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

#[test]
fn malformed_files_from_cli_and_environment_are_both_reported() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let cli_path = temp_dir.path().join("cli_ipmid.toml");
    let env_path = temp_dir.path().join("env_ipmid.toml");
    fs::write(
        &cli_path,
        r#"daemon_socket = { transport = "tcp" host = "127.0.0.1" }"#,
    )
    .expect("write malformed cli config");
    fs::write(&env_path, "bus_bridge_uid = not_a_number\n").expect("write malformed env config");

    let error = {
        let _env = EnvOverride::set_var("IPMID_CONFIG_PATH", env_path.as_os_str());
        let args = vec![
            OsString::from("ipmid"),
            OsString::from("--config-path"),
            cli_path.clone().into_os_string(),
        ];
        Config::load_from_iter(args).expect_err("loading must fail")
    };

    match error.ortho() {
        Some(OrthoError::Aggregate(aggregate)) => {
            let mentioned: Vec<_> = aggregate
                .iter()
                .filter_map(|err| match err {
                    OrthoError::File { path, .. } => Some(path.clone()),
                    _ => None,
                })
                .collect();
            assert!(mentioned.contains(&cli_path), "missing CLI path: {mentioned:?}");
            assert!(mentioned.contains(&env_path), "missing env path: {mentioned:?}");
        }
        other => panic!("expected aggregated error, got {other:?}"),
    }
}

#[test]
fn invalid_socket_in_environment_fails() {
    let error = {
        let _env = EnvOverride::set_var("IPMID_DAEMON_SOCKET", OsStr::new("ftp://controller"));
        Config::load_from_iter(["ipmid"]).expect_err("unsupported scheme should fail")
    };

    assert!(matches!(error, ConfigError::Load(_)), "got {error:?}");
    assert!(error.to_string().contains("ftp"), "got {error}");
}

#[test]
fn malformed_channel_owner_in_file_fails() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("ipmid.toml");
    fs::write(
        &path,
        "channel_owners = [\"xyz.openbmc_project.Ipmi.Channel.kcs\"]\n",
    )
    .expect("write config");

    let error = {
        let _env = EnvOverride::set_var("IPMID_CONFIG_PATH", path.as_os_str());
        Config::load_from_iter(["ipmid"]).expect_err("owner without connection")
    };

    match error {
        ConfigError::InvalidValue { key, value, .. } => {
            assert_eq!(key, CHANNEL_OWNERS_KEY);
            assert_eq!(value, "xyz.openbmc_project.Ipmi.Channel.kcs");
        }
        other => panic!("unexpected error: {other}"),
    }
}
