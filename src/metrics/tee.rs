//! Console tee feeding the metrics collector

use std::io::{self, Write};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Lines buffered for the collector before new ones are dropped
pub const TEE_CAPACITY: usize = 100;

/// Writer that copies everything to `inner` and offers it to a channel.
///
/// The console write always happens first and never waits on the channel.
/// Dropping the tee closes the channel.
pub struct LineTee<W: Write> {
    inner: W,
    tx: mpsc::Sender<String>,
    dropped: u64,
}

/// Wrap `inner` with a tee of the default capacity
pub fn tee<W: Write>(inner: W) -> (LineTee<W>, mpsc::Receiver<String>) {
    LineTee::with_capacity(inner, TEE_CAPACITY)
}

impl<W: Write> LineTee<W> {
    pub fn with_capacity(inner: W, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                inner,
                tx,
                dropped: 0,
            },
            rx,
        )
    }

    /// Lines that did not fit in the channel
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<W: Write> Write for LineTee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_all(buf)?;

        match self.tx.try_send(String::from_utf8_lossy(buf).into_owned()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            // Collector is gone; the console copy is all that matters now.
            Err(TrySendError::Closed(_)) => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Drop for LineTee<W> {
    fn drop(&mut self) {
        if self.dropped > 0 {
            debug!("Cache metrics skipped {} lines under backpressure", self.dropped);
        }
    }
}
