//! In-memory duplex byte stream with single-slot readiness signalling.
//!
//! A [`LoopbackChannel::pair`] yields two endpoints wired crosswise: what one
//! endpoint writes, the other reads. Each direction is a byte accumulator
//! guarded by a "data ready" signal of capacity one; a reader suspends until
//! the signal is raised, then drains whatever has been buffered. The intended
//! usage is strictly write-then-signal-then-read: the signal is only raised
//! after the writer has produced a complete frame, so a reader never observes
//! a partial write.
//!
//! A closed channel fails pending and future reads with
//! [`TransportError::Closed`] rather than blocking forever, and a pair can be
//! created with a read timeout for callers that want a bounded wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use super::TransportError;

/// One direction of the duplex stream: a byte accumulator plus its
/// single-slot readiness signal.
#[derive(Debug)]
struct PipeHalf {
    buf: parking_lot::Mutex<BytesMut>,
    ready_tx: mpsc::Sender<()>,
    ready_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    closed: AtomicBool,
    read_timeout: Option<Duration>,
}

impl PipeHalf {
    fn new(read_timeout: Option<Duration>) -> Self {
        // Capacity one: repeated signals between reads coalesce.
        let (ready_tx, ready_rx) = mpsc::channel(1);
        PipeHalf {
            buf: parking_lot::Mutex::new(BytesMut::new()),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            closed: AtomicBool::new(false),
            read_timeout,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Wake a blocked reader so it can observe the closed flag.
        let _ = self.ready_tx.try_send(());
    }
}

/// Factory for connected endpoint pairs.
pub struct LoopbackChannel;

impl LoopbackChannel {
    /// Create a connected pair of endpoints.
    ///
    /// Reads block until data is signalled or the channel is closed.
    pub fn pair() -> (LoopbackEndpoint, LoopbackEndpoint) {
        Self::build(None)
    }

    /// Create a connected pair whose reads give up with
    /// [`TransportError::Timeout`] after `timeout` of waiting.
    pub fn pair_with_timeout(timeout: Duration) -> (LoopbackEndpoint, LoopbackEndpoint) {
        Self::build(Some(timeout))
    }

    fn build(read_timeout: Option<Duration>) -> (LoopbackEndpoint, LoopbackEndpoint) {
        let a_to_b = Arc::new(PipeHalf::new(read_timeout));
        let b_to_a = Arc::new(PipeHalf::new(read_timeout));

        let a = LoopbackEndpoint {
            incoming: Arc::clone(&b_to_a),
            outgoing: Arc::clone(&a_to_b),
        };
        let b = LoopbackEndpoint {
            incoming: a_to_b,
            outgoing: b_to_a,
        };
        (a, b)
    }
}

/// One side of a loopback channel.
///
/// Cloning an endpoint yields another handle to the same side; a pair plus
/// its clones is owned by a single logical connection.
#[derive(Clone, Debug)]
pub struct LoopbackEndpoint {
    incoming: Arc<PipeHalf>,
    outgoing: Arc<PipeHalf>,
}

impl LoopbackEndpoint {
    /// Append bytes to the outgoing buffer. Does not signal readiness.
    pub fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.outgoing.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.outgoing.buf.lock().extend_from_slice(bytes);
        Ok(())
    }

    /// Raise the peer's "data ready" signal. Signals coalesce: raising an
    /// already-raised signal is a no-op.
    pub fn signal(&self) {
        let _ = self.outgoing.ready_tx.try_send(());
    }

    /// Take everything currently buffered for this endpoint, suspending
    /// until data is signalled.
    ///
    /// Fails with [`TransportError::Closed`] once the channel is closed and
    /// drained, and with [`TransportError::Timeout`] if the pair was created
    /// with a read timeout that elapses first.
    pub async fn read(&self) -> Result<Bytes, TransportError> {
        let mut ready = self.incoming.ready_rx.lock().await;
        loop {
            {
                let mut buf = self.incoming.buf.lock();
                if !buf.is_empty() {
                    return Ok(buf.split().freeze());
                }
            }
            if self.incoming.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }

            let signal = match self.incoming.read_timeout {
                Some(timeout) => tokio::time::timeout(timeout, ready.recv())
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => ready.recv().await,
            };
            if signal.is_none() {
                return Err(TransportError::Closed);
            }
        }
    }

    /// Close both directions. Buffered data can still be read; blocked
    /// readers on either side wake up and fail fast.
    pub fn close(&self) {
        self.incoming.close();
        self.outgoing.close();
    }

    /// Whether the channel has been closed from either side.
    pub fn is_closed(&self) -> bool {
        self.incoming.closed.load(Ordering::Acquire)
            || self.outgoing.closed.load(Ordering::Acquire)
    }
}
