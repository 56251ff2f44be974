//! Request socket endpoints.
//!
//! An endpoint is written as a URL everywhere a human supplies one
//! (`unix:///run/ipmid/ipmid.sock`, `tcp://127.0.0.1:9623`). Configuration
//! files may also spell it as a table tagged by `transport`.

use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Where the daemon accepts request connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEndpoint {
    /// Unix domain socket at `path`.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP listener; port `0` binds an ephemeral port.
    Tcp {
        /// Host name or address to bind.
        host: String,
        /// Port to bind.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Unix socket endpoint at `path`.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// TCP endpoint on `host:port`.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket path for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        if let Self::Unix { path } = self {
            Some(path)
        } else {
            None
        }
    }

    /// Creates the directory holding a Unix socket, mode 0700 on Unix.
    ///
    /// TCP endpoints need no preparation.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the socket path has no parent
    /// or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_owned(),
            })?;
        create_private_dir(parent).map_err(|source| SocketPreparationError::CreateDirectory {
            path: parent.to_owned(),
            source,
        })
    }
}

fn create_private_dir(dir: &Utf8Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    match builder.create(dir) {
        Err(error) if error.kind() != io::ErrorKind::AlreadyExists => Err(error),
        _ => Ok(()),
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" if url.path().is_empty() => {
                Err(SocketParseError::MissingUnixPath(input.to_owned()))
            }
            "unix" => Ok(Self::unix(url.path())),
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl Serialize for SocketEndpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Url(String),
    Table(EndpointTable),
}

#[derive(Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case", deny_unknown_fields)]
enum EndpointTable {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

impl<'de> Deserialize<'de> for SocketEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match EndpointRepr::deserialize(deserializer)? {
            EndpointRepr::Url(text) => text.parse().map_err(serde::de::Error::custom),
            EndpointRepr::Table(EndpointTable::Unix { path }) => Ok(Self::Unix { path }),
            EndpointRepr::Table(EndpointTable::Tcp { host, port }) => Ok(Self::Tcp { host, port }),
        }
    }
}

/// Reasons an endpoint URL is rejected.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Only `unix` and `tcp` are served.
    #[error("socket scheme '{0}' is neither unix nor tcp")]
    UnsupportedScheme(String),
    /// `tcp://` URL without a host.
    #[error("TCP endpoint '{0}' names no host")]
    MissingHost(String),
    /// `tcp://` URL without a port.
    #[error("TCP endpoint '{0}' names no port")]
    MissingPort(String),
    /// `unix://` URL without a path.
    #[error("Unix endpoint '{0}' names no path")]
    MissingUnixPath(String),
    /// Not a URL at all.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Failures creating the socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path is a bare file name.
    #[error("Unix socket '{path}' is not inside a directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// The directory could not be created.
    #[error("cannot create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn formats_as_url() {
        let endpoint = SocketEndpoint::unix("/run/ipmid/ipmid.sock");
        assert_eq!(endpoint.to_string(), "unix:///run/ipmid/ipmid.sock");
        assert_eq!(
            serde_json::to_string(&SocketEndpoint::tcp("127.0.0.1", 9623)).expect("serialise"),
            r#""tcp://127.0.0.1:9623""#
        );
    }

    #[rstest]
    #[case::url(r#""tcp://127.0.0.1:9623""#)]
    #[case::table(r#"{"transport":"tcp","host":"127.0.0.1","port":9623}"#)]
    fn deserialises_url_or_table(#[case] text: &str) {
        let endpoint: SocketEndpoint = serde_json::from_str(text).expect("deserialise");
        assert_eq!(endpoint, SocketEndpoint::tcp("127.0.0.1", 9623));
    }

    #[rstest]
    #[case::scheme("http://localhost:80")]
    #[case::no_port("tcp://localhost")]
    #[case::not_a_url("controller")]
    fn rejects_unusable_endpoints(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err());
        let quoted = format!("\"{input}\"");
        assert!(serde_json::from_str::<SocketEndpoint>(&quoted).is_err());
    }

    #[test]
    fn prepares_parent_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("nested").join("ipmid.sock");
        let endpoint = SocketEndpoint::unix(socket.to_str().expect("utf8 path"));
        endpoint.prepare_filesystem().expect("prepare");
        assert!(dir.path().join("nested").is_dir());
        endpoint.prepare_filesystem().expect("prepare twice");
    }

    #[test]
    fn rejects_socket_without_parent() {
        let error = SocketEndpoint::unix("ipmid.sock")
            .prepare_filesystem()
            .expect_err("bare file name has no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
