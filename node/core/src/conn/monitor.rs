//! Per-direction stream monitor

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::identity::Identity;
use crate::stream::Duplex;

/// Callback run once after the wrapped stream has been closed
pub type CloseHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// [`Duplex`] decorator that counts bytes and records the last write
///
/// Writes are counted before they are handed to the inner stream, so a write
/// that later fails is still reflected in [`bytes`](Self::bytes).
pub struct MonitoredWriter {
    inner: Arc<dyn Duplex>,
    bytes: AtomicU64,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
    after_close: Mutex<Option<CloseHook>>,
}

impl MonitoredWriter {
    /// Wrap a stream
    pub fn new(inner: Arc<dyn Duplex>) -> Self {
        Self {
            inner,
            bytes: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            after_close: Mutex::new(None),
        }
    }

    /// Wrap a stream and run `hook` after it is closed
    pub fn with_hook(inner: Arc<dyn Duplex>, hook: CloseHook) -> Self {
        let writer = Self::new(inner);
        *writer.after_close.lock() = Some(hook);
        writer
    }

    /// Total bytes written through this monitor
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Time of the last write (or of creation)
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The wrapped stream
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Duplex> {
        &self.inner
    }
}

#[async_trait]
impl Duplex for MonitoredWriter {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.fetch_add(buf.len() as u64, Ordering::Relaxed);
        *self.last_activity.lock() = Instant::now();
        self.inner.write(buf).await
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let res = self.inner.close().await;
        let hook = self.after_close.lock().take();
        if let Some(hook) = hook {
            hook().await;
        }
        res
    }

    fn identity(&self) -> Option<Identity> {
        self.inner.identity()
    }
}

impl std::fmt::Debug for MonitoredWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredWriter")
            .field("bytes", &self.bytes())
            .field("closed", &self.is_closed())
            .finish()
    }
}
