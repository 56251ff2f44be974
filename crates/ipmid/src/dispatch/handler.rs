//! Connection handler that serves the JSONL protocol.
//!
//! One connection carries any number of messages. Each execute message is
//! dispatched as its own local task, so replies may arrive out of order and
//! carry the caller's `id`. Replies funnel through a single writer task per
//! connection.
//!
//! The daemon names every connection itself. Only the bus bridge, a Unix
//! peer running as the configured user, may relay the sender of a request or
//! report ownership changes.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream, ReadHalf, WriteHalf};

use super::errors::ProtocolError;
use super::request::{ClientMessage, execute_request};
use super::response::DaemonMessage;
use super::router::{DISPATCH_TARGET, Dispatcher};

/// Maximum size of a single request line in bytes, delimiter included.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Prefix of daemon-assigned connection identities.
pub(crate) const CONNECTION_PREFIX: &str = ":ipmid.";

type Outbox = UnboundedSender<DaemonMessage>;

/// Who is on the other end of a connection.
#[derive(Debug)]
struct Peer {
    identity: String,
    bridge: bool,
}

/// Connection handler feeding client messages to a shared [`Dispatcher`].
#[derive(Debug)]
pub(crate) struct DispatchConnectionHandler {
    dispatcher: Rc<Dispatcher>,
    bridge_uid: Option<u32>,
    next_connection: Cell<u64>,
}

impl DispatchConnectionHandler {
    pub(crate) fn new(dispatcher: Rc<Dispatcher>, bridge_uid: Option<u32>) -> Self {
        Self {
            dispatcher,
            bridge_uid,
            next_connection: Cell::new(1),
        }
    }

    fn identify(&self, stream: &ConnectionStream) -> Peer {
        let serial = self.next_connection.get();
        self.next_connection.set(serial.wrapping_add(1));
        let bridge = self.bridge_uid.is_some() && stream.peer_uid() == self.bridge_uid;
        Peer {
            identity: format!("{CONNECTION_PREFIX}{serial}"),
            bridge,
        }
    }

    fn accept_line(
        &self,
        peer: &Peer,
        line: &[u8],
        outbox: &Outbox,
        requests: &mut JoinSet<()>,
    ) -> Result<(), ProtocolError> {
        let message = ClientMessage::parse(line)?;
        debug!(
            target: DISPATCH_TARGET,
            id = message.id(),
            connection = peer.identity.as_str(),
            "message received"
        );
        match message {
            ClientMessage::Execute {
                id,
                sender,
                netfn,
                lun,
                cmd,
                data,
                options,
            } => {
                let sender = match sender {
                    Some(relayed) if peer.bridge => relayed,
                    Some(_) => {
                        debug!(
                            target: DISPATCH_TARGET,
                            id,
                            connection = peer.identity.as_str(),
                            "ignoring sender from untrusted connection"
                        );
                        peer.identity.clone()
                    }
                    None => peer.identity.clone(),
                };
                let dispatcher = Rc::clone(&self.dispatcher);
                let outbox = outbox.clone();
                let request = execute_request(sender, netfn, lun, cmd, data, options);
                requests.spawn_local(async move {
                    let response = dispatcher.execute(request).await;
                    deliver(&outbox, DaemonMessage::response(id, response));
                });
            }
            ClientMessage::NameOwnerChanged {
                id,
                name,
                old_owner,
                new_owner,
            } => {
                if !peer.bridge {
                    return Err(ProtocolError::forbidden("name_owner_changed"));
                }
                self.dispatcher
                    .channels()
                    .name_owner_changed(&name, &old_owner, &new_owner);
                deliver(outbox, DaemonMessage::Ack { id });
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl ConnectionHandler for DispatchConnectionHandler {
    async fn handle(&self, stream: ConnectionStream) {
        let peer = self.identify(&stream);
        debug!(
            target: DISPATCH_TARGET,
            connection = peer.identity.as_str(),
            bridge = peer.bridge,
            "client connected"
        );
        let (read, write) = stream.into_split();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let writer = tokio::task::spawn_local(write_messages(write, inbox));
        let mut reader = BufReader::new(read);
        let mut requests = JoinSet::new();

        loop {
            let result = match read_request_line(&mut reader).await {
                Ok(Some(line)) => self.accept_line(&peer, &line, &outbox, &mut requests),
                Ok(None) => {
                    debug!(target: DISPATCH_TARGET, "client disconnected");
                    break;
                }
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                warn!(target: DISPATCH_TARGET, %error, "rejected client message");
                deliver(&outbox, DaemonMessage::error(&error));
                if !error.is_recoverable() {
                    break;
                }
            }
            while requests.try_join_next().is_some() {}
        }

        while requests.join_next().await.is_some() {}
        drop(outbox);
        if writer.await.is_err() {
            warn!(target: DISPATCH_TARGET, "connection writer panicked");
        }
    }
}

fn deliver(outbox: &Outbox, message: DaemonMessage) {
    if outbox.send(message).is_err() {
        debug!(target: DISPATCH_TARGET, "reply dropped; connection writer closed");
    }
}

async fn write_messages(mut writer: WriteHalf, mut inbox: UnboundedReceiver<DaemonMessage>) {
    while let Some(message) = inbox.recv().await {
        let result = match message.to_line() {
            Ok(line) => writer.write_all(&line).await.map_err(ProtocolError::from),
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => {}
            Err(error @ ProtocolError::Io(_)) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to write reply");
                return;
            }
            Err(error) => warn!(target: DISPATCH_TARGET, %error, "failed to encode reply"),
        }
    }
    if let Err(error) = writer.shutdown().await {
        debug!(target: DISPATCH_TARGET, %error, "connection shutdown failed");
    }
}

/// Reads one bounded line.
///
/// Returns `Ok(None)` once the client has closed its side and no partial line
/// remains.
async fn read_request_line(
    reader: &mut BufReader<ReadHalf>,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut buffer = Vec::new();
    let limit = u64::try_from(MAX_REQUEST_BYTES).map_or(u64::MAX, |max| max.saturating_add(1));
    let read = (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut buffer)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if buffer.len() > MAX_REQUEST_BYTES {
        return Err(ProtocolError::request_too_large(MAX_REQUEST_BYTES));
    }
    Ok(Some(buffer))
}
