//! IPMI command router daemon.
//!
//! The daemon accepts IPMI requests from transport bridges over a JSONL
//! socket, resolves the channel each request arrived on, applies the
//! pre-dispatch filter chain and the privilege gate, and invokes the handler
//! registered for the request's network function and command. Every request
//! yields exactly one response carrying an IPMI completion code.
//!
//! Handlers and filters come from [`CommandProvider`]s linked into the
//! binary. Each provider registers once at startup, in name order, through a
//! [`Registrar`]; the tables are read-only while requests are served.
//!
//! Requests are dispatched on a single-threaded Tokio runtime. A handler may
//! suspend while it waits on other services, and other requests keep flowing
//! meanwhile. Handler and filter traits therefore carry no `Send` bound.

mod bootstrap;
mod channel;
mod context;
mod dispatch;
mod filter;
mod health;
mod message;
mod privilege;
mod process;
mod provider;
mod registry;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, ServeError, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with, bootstrap_with_directory,
};
pub use channel::{
    CHANNEL_PROVIDER_PREFIX, ChannelResolver, DirectoryError, INTRA_BMC_CHANNEL_NAME,
    NameDirectory, StaticNameDirectory,
};
pub use context::{
    ContextBuilder, OPTION_PRIVILEGE, OPTION_RQ_SA, OPTION_SESSION_ID, OPTION_USER_ID,
    OptionValue, Options,
};
pub use dispatch::{
    ClientMessage, DaemonMessage, Dispatcher, Drained, ExecuteRequest, ExecuteResponse,
    MessageId, ProtocolError,
};
pub use filter::{CommandFilter, FilterChain};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use message::{
    CMD_WILDCARD, Cmd, CompletionCode, Group, IANA_LEN, Iana, Lun, NetFn, Priority, Request,
    RequestContext, Response, Route, decode_iana, encode_iana, group, netfn, priority,
};
pub use privilege::Privilege;
pub use process::{LaunchError, ShutdownError, run_daemon};
pub use provider::{CommandProvider, ProviderSet, Registrar, RegistrationSummary};
pub use registry::{
    CommandHandler, HandlerEntry, HandlerFn, HandlerRegistry, RegistrationError, handler_fn,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
