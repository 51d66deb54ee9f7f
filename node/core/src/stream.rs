//! Duplex Streams
//!
//! The router core only ever writes to and closes streams; reading is the
//! business of whoever accepted the connection. [`Duplex`] is therefore the
//! write half plus close.
//!
//! [`ChannelWriter`] is the in-memory implementation used by local services
//! and tests: bytes written to it show up on the paired [`mpsc::Receiver`].

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::identity::Identity;

/// Bidirectional byte stream as seen by the router
#[async_trait]
pub trait Duplex: Send + Sync {
    /// Write a chunk, returning the number of bytes accepted
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close the stream; closing twice is a no-op
    async fn close(&self) -> io::Result<()>;

    /// Principal behind this stream, if known
    fn identity(&self) -> Option<Identity> {
        None
    }
}

/// Channel-backed [`Duplex`]
pub struct ChannelWriter {
    identity: Option<Identity>,
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    closed: AtomicBool,
}

/// Create a writer and the receiver that observes everything written to it
///
/// The receiver yields `None` once the writer is closed.
#[must_use]
pub fn pipe(identity: Option<Identity>, capacity: usize) -> (ChannelWriter, mpsc::Receiver<Vec<u8>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let writer = ChannelWriter {
        identity,
        tx: Mutex::new(Some(tx)),
        closed: AtomicBool::new(false),
    };
    (writer, rx)
}

impl ChannelWriter {
    /// Whether [`Duplex::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Duplex for ChannelWriter {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))?;
        tx.send(buf.to_vec())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))?;
        Ok(buf.len())
    }

    async fn close(&self) -> io::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // dropping the sender ends the receiver's stream
            self.tx.lock().take();
        }
        Ok(())
    }

    fn identity(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

impl std::fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
