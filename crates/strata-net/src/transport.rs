//! Per-connection tokio tasks.
//!
//! Each TCP connection gets a reader task (frames → packets → inbound queue)
//! and a writer task (outbound channel → frames). The tasks only move bytes
//! and packets; they never touch world state.

use crossbeam_channel::Sender;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::framing::{FrameError, read_frame, write_frame};
use crate::packet::Packet;
use crate::queue::{ConnectionEvent, InboundSender, OverflowPolicy, QueueError};

/// Owning handle to a live connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    client_id: u32,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    /// Dropped together with the handle, which stops the reader task.
    _close: watch::Sender<()>,
}

impl ConnectionHandle {
    /// Id of the peer on the other end.
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Queues an encoded frame body for sending. Returns `false` if the
    /// writer task has already stopped.
    pub fn send_frame(&self, body: Vec<u8>) -> bool {
        self.outbound.send(body).is_ok()
    }

    /// Encodes and queues `packet`.
    pub fn send(&self, packet: &Packet) -> bool {
        match packet.encode() {
            Ok(body) => self.send_frame(body),
            Err(e) => {
                tracing::warn!("Not sending {:?} to {}: {e}", packet.id(), self.client_id);
                false
            }
        }
    }
}

/// Everything a reader task needs besides the socket.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Where decoded packets go.
    pub inbound: InboundSender,
    /// Where lifecycle events go.
    pub events: Sender<ConnectionEvent>,
    /// What to do when `inbound` is full.
    pub overflow: OverflowPolicy,
}

/// A connection whose handle exists but whose tasks are not running yet.
///
/// Splitting creation from [`PendingConnection::start`] lets the owner
/// register the handle and announce the connection before the reader task
/// can report it closed.
#[derive(Debug)]
pub struct PendingConnection {
    client_id: u32,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    close_rx: watch::Receiver<()>,
    ctx: ConnectionContext,
}

impl PendingConnection {
    /// Spawns the reader and writer tasks on `runtime`.
    pub fn start(self, runtime: &Handle) {
        let Self {
            client_id,
            reader,
            writer,
            outbound,
            close_rx,
            ctx,
        } = self;
        runtime.spawn(write_loop(client_id, writer, outbound));
        runtime.spawn(async move {
            read_loop(client_id, reader, &ctx, close_rx).await;
            let _ = ctx.events.send(ConnectionEvent::Disconnected(client_id));
            tracing::info!("Connection {client_id} closed");
        });
    }
}

/// Splits `stream` into a handle and the not-yet-started connection tasks.
pub fn open_connection(
    stream: TcpStream,
    client_id: u32,
    ctx: ConnectionContext,
) -> (ConnectionHandle, PendingConnection) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!("Failed to set TCP_NODELAY for {client_id}: {e}");
    }
    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = watch::channel(());
    let handle = ConnectionHandle {
        client_id,
        outbound: outbound_tx,
        _close: close_tx,
    };
    let pending = PendingConnection {
        client_id,
        reader,
        writer,
        outbound: outbound_rx,
        close_rx,
        ctx,
    };
    (handle, pending)
}

/// Opens `stream` and immediately starts its tasks on `runtime`.
pub fn spawn_connection(
    runtime: &Handle,
    stream: TcpStream,
    client_id: u32,
    ctx: ConnectionContext,
) -> ConnectionHandle {
    let (handle, pending) = open_connection(stream, client_id, ctx);
    pending.start(runtime);
    handle
}

/// Reads frames until the peer disconnects, the handle is dropped, or the
/// overflow policy or a fatal packet error ends the connection.
async fn read_loop(
    client_id: u32,
    mut reader: OwnedReadHalf,
    ctx: &ConnectionContext,
    mut close_rx: watch::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                let body = match result {
                    Ok(body) => body,
                    Err(FrameError::ConnectionClosed) => break,
                    Err(e) => {
                        tracing::warn!("Connection {client_id} read failed: {e}");
                        break;
                    }
                };
                match Packet::decode(&body) {
                    Ok(packet) => {
                        tracing::trace!("Connection {client_id} received {:?}", packet.id());
                        match ctx.inbound.push(client_id, packet) {
                            Ok(()) => {}
                            Err(QueueError::Full) if ctx.overflow == OverflowPolicy::DropPacket => {
                                tracing::warn!("Inbound queue full, dropping packet from {client_id}");
                            }
                            Err(QueueError::Full) => {
                                tracing::warn!("Inbound queue full, disconnecting {client_id}");
                                break;
                            }
                            Err(QueueError::Closed) => break,
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::warn!("Dropping connection {client_id}: {e}");
                        break;
                    }
                    Err(e) => tracing::warn!("Dropping packet from {client_id}: {e}"),
                }
            }
            _ = close_rx.changed() => break,
        }
    }
}

/// Writes queued frames until every sender is gone or the socket fails.
async fn write_loop(
    client_id: u32,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(body) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &body).await {
            tracing::warn!("Connection {client_id} write failed: {e}");
            break;
        }
    }
}
