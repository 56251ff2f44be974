//! IPMI request dispatch and its JSONL transport protocol.
//!
//! [`Dispatcher`] owns the handler registry, the filter chain and the context
//! builder, and turns every execute call into exactly one response. The
//! connection handler in this module feeds it from the socket listener.
//!
//! ## Protocol
//!
//! Each line a client sends is one JSON object tagged by `kind`:
//!
//! ```json
//! {"kind":"execute","id":1,"sender":":1.42","netfn":6,"lun":0,"cmd":1,"data":[],"options":{}}
//! {"kind":"name_owner_changed","id":2,"name":"xyz.openbmc_project.Ipmi.Channel.eth0","old_owner":"","new_owner":":1.42"}
//! ```
//!
//! The daemon answers each with a `response` or an `ack` carrying the same
//! `id`. Lines it cannot parse get an `error` reply and the connection stays
//! open:
//!
//! ```json
//! {"kind":"response","id":1,"netfn":7,"lun":0,"cmd":1,"cc":0,"data":[]}
//! {"kind":"ack","id":2}
//! {"kind":"error","message":"malformed JSONL: expected value at line 1 column 1"}
//! ```

mod errors;
mod handler;
mod request;
mod response;
mod router;

pub use self::errors::ProtocolError;
pub(crate) use self::handler::DispatchConnectionHandler;
pub use self::request::{ClientMessage, MessageId};
pub use self::response::DaemonMessage;
pub use self::router::{Dispatcher, Drained, ExecuteRequest, ExecuteResponse};
