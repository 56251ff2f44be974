//! Socket listener for daemon transport endpoints.
//!
//! The transport module binds to configured socket endpoints and accepts
//! connections as local tasks on the daemon's single-threaded runtime.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream, ReadHalf, WriteHalf};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
