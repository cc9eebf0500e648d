//! Transport capability consumed by the node.
//!
//! The node speaks to its forwarder over one framed connection. Concrete
//! transports (TCP, Unix socket, QUIC) live outside this crate; the node
//! only needs the narrow surface below. An in-memory loopback pair ships
//! here for tests and embedders.

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::sync::mpsc;

use rust_ndnc_common::{Error, Result};

/// A framed connection to an NDN forwarder.
///
/// `connect` wires the receive side: every inbound TLV frame is pushed
/// into the provided sink. `send` queues one outbound frame and returns
/// without awaiting, so Interest handlers can reply from inside the event
/// loop; implementations flush asynchronously.
#[async_trait]
pub trait Transport: Send {
    /// Whether `connect` has completed.
    fn is_connected(&self) -> bool;

    /// Establishes the connection and installs the receive sink.
    /// Idempotent once connected.
    async fn connect(&mut self, sink: mpsc::UnboundedSender<Bytes>) -> Result<()>;

    /// Queues one frame for transmission.
    fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Closes the connection. Further sends fail.
    async fn close(&mut self);
}

/* ---------------------------------------------------------------- *
 * In-memory loopback
 * ---------------------------------------------------------------- */

/// Node-side endpoint of an in-memory transport. See [`memory_pair`].
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Option<mpsc::UnboundedReceiver<Bytes>>,
    connected: bool,
    closed: bool,
}

/// Far end of a [`MemoryTransport`], playing the forwarder's role.
pub struct MemoryPeer {
    /// Frames the node sent.
    pub from_node: mpsc::UnboundedReceiver<Bytes>,
    /// Feeds frames to the node.
    pub to_node: mpsc::UnboundedSender<Bytes>,
}

/// Creates a connected pair: a transport for the node and the peer handle
/// that observes what the node sends and injects inbound frames.
pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            outbound: out_tx,
            inbound: Some(in_rx),
            connected: false,
            closed: false,
        },
        MemoryPeer {
            from_node: out_rx,
            to_node: in_tx,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, sink: mpsc::UnboundedSender<Bytes>) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        if self.closed {
            return Err(Error::Transport("transport is closed".into()));
        }
        let mut inbound = self
            .inbound
            .take()
            .ok_or_else(|| Error::Transport("receive side already consumed".into()))?;

        // Pump inbound frames into the node's sink until either end drops.
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if sink.send(frame).is_err() {
                    break;
                }
            }
            debug!("[MemoryTransport] inbound pump finished");
        });

        self.connected = true;
        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("transport is closed".into()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| Error::Transport("peer dropped".into()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("[MemoryTransport] closing");
        self.closed = true;
        self.connected = false;
    }
}
