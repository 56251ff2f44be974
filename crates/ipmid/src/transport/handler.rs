//! Connection handling abstractions for the daemon listener.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

#[cfg(unix)]
use tokio::net::UnixStream;

/// Owned read half of an accepted connection.
pub(crate) type ReadHalf = Box<dyn AsyncRead + Unpin>;
/// Owned write half of an accepted connection.
pub(crate) type WriteHalf = Box<dyn AsyncWrite + Unpin>;

/// Stream types accepted by the daemon listener.
#[derive(Debug)]
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// User id of the peer process, known only for Unix sockets.
    pub(crate) fn peer_uid(&self) -> Option<u32> {
        match self {
            Self::Tcp(_) => None,
            #[cfg(unix)]
            Self::Unix(stream) => stream.peer_cred().ok().map(|cred| cred.uid()),
        }
    }

    /// Splits the stream so reads and writes can proceed independently.
    pub(crate) fn into_split(self) -> (ReadHalf, WriteHalf) {
        match self {
            Self::Tcp(stream) => {
                let (read, write) = stream.into_split();
                (Box::new(read), Box::new(write))
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                let (read, write) = stream.into_split();
                (Box::new(read), Box::new(write))
            }
        }
    }
}

/// Handles accepted socket connections.
///
/// Each call runs as its own local task; implementations should avoid
/// panicking.
#[async_trait(?Send)]
pub(crate) trait ConnectionHandler: 'static {
    /// Serves a single connection until the peer disconnects.
    async fn handle(&self, stream: ConnectionStream);
}
