//! Connection handles used to deliver updates to subscribers.

use crate::error::{Result, StreamError};
use crate::types::StreamUpdate;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a connection. Fan-out deduplicates on this.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live delivery channel owned by the transport layer.
///
/// The store only holds a reference. `send` is called while the store's
/// lock is held, so it must not block: buffer, or fail fast.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn send(&self, update: &StreamUpdate) -> Result<()>;
}

/// Connection backed by a bounded in-process channel.
pub struct ChannelConnection {
    id: ConnectionId,
    sender: Sender<StreamUpdate>,
}

impl ChannelConnection {
    /// Create a connection and the handle that reads from it. The buffer
    /// holds at least one update.
    pub fn channel(buffer_size: usize) -> (Self, ConnectionHandle) {
        let id = ConnectionId::next();
        let (sender, receiver) = bounded(buffer_size.max(1));
        (Self { id, sender }, ConnectionHandle { id, receiver })
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, update: &StreamUpdate) -> Result<()> {
        match self.sender.try_send(update.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(StreamError::BufferFull(self.id)),
            Err(TrySendError::Disconnected(_)) => Err(StreamError::Disconnected(self.id)),
        }
    }
}

/// Receiving side of a [`ChannelConnection`].
pub struct ConnectionHandle {
    pub id: ConnectionId,
    /// Channel to receive updates.
    pub receiver: Receiver<StreamUpdate>,
}

impl ConnectionHandle {
    /// Receive the next update (blocking).
    pub fn recv(&self) -> std::result::Result<StreamUpdate, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an update (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<StreamUpdate, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<StreamUpdate, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<StreamUpdate> {
        self.receiver.try_iter().collect()
    }
}

/// Connection that writes each update as one JSON line.
///
/// Lines go through a bounded queue to a dedicated writer thread, so a
/// stalled writer fills the queue instead of blocking the store. After a
/// write error the thread exits and later sends report `Disconnected`.
pub struct WriterConnection<W> {
    id: ConnectionId,
    queue: Sender<String>,
    writer: JoinHandle<W>,
}

impl<W: Write + Send + 'static> WriterConnection<W> {
    /// Start the writer thread with room for `buffer_size` pending lines.
    pub fn spawn(writer: W, buffer_size: usize) -> Result<Self> {
        let id = ConnectionId::next();
        let (queue, lines) = bounded::<String>(buffer_size.max(1));

        let writer = thread::Builder::new()
            .name(format!("connection-writer-{}", id))
            .spawn(move || {
                let mut writer = writer;
                for line in lines {
                    if let Err(e) = writer
                        .write_all(line.as_bytes())
                        .and_then(|()| writer.flush())
                    {
                        warn!(connection = %id, error = %e, "write failed, closing connection");
                        break;
                    }
                }
                writer
            })?;

        Ok(Self { id, queue, writer })
    }

    /// Stop accepting lines, wait for the queue to drain, and return the
    /// writer. `None` if the writer thread panicked.
    pub fn finish(self) -> Option<W> {
        drop(self.queue);
        self.writer.join().ok()
    }
}

impl<W: Write + Send + 'static> Connection for WriterConnection<W> {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, update: &StreamUpdate) -> Result<()> {
        let line = update.to_json_line()?;
        match self.queue.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(StreamError::BufferFull(self.id)),
            Err(TrySendError::Disconnected(_)) => Err(StreamError::Disconnected(self.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UpdateStatus;
    use std::io::{BufRead, BufReader, Seek, SeekFrom};
    use std::time::Instant;

    fn update(message: &str) -> StreamUpdate {
        StreamUpdate::new("exec-1", "stage", UpdateStatus::Info, message, "t")
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ha) = ChannelConnection::channel(1);
        let (b, _hb) = ChannelConnection::channel(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_channel_full_and_closed() {
        let (conn, handle) = ChannelConnection::channel(1);
        conn.send(&update("one")).unwrap();
        assert!(matches!(
            conn.send(&update("two")),
            Err(StreamError::BufferFull(_))
        ));

        assert_eq!(handle.try_recv().unwrap().message, "one");
        drop(handle);
        assert!(matches!(
            conn.send(&update("three")),
            Err(StreamError::Disconnected(_))
        ));
    }

    #[test]
    fn test_zero_buffer_still_holds_one() {
        let (conn, handle) = ChannelConnection::channel(0);
        conn.send(&update("one")).unwrap();
        assert_eq!(handle.try_recv().unwrap().message, "one");
    }

    #[test]
    fn test_writer_emits_json_lines() {
        let mut file = tempfile::tempfile().unwrap();
        let conn = WriterConnection::spawn(file.try_clone().unwrap(), 8).unwrap();
        conn.send(&update("first")).unwrap();
        conn.send(&update("second")).unwrap();
        conn.finish().unwrap();

        file.seek(SeekFrom::Start(0)).unwrap();
        let lines: Vec<String> = BufReader::new(file).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);

        let parsed: StreamUpdate = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(parsed.message, "second");
    }

    #[test]
    fn test_writer_failure_closes_connection() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let conn = WriterConnection::spawn(Broken, 4).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut result = conn.send(&update("x"));
        while result.is_ok() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
            result = conn.send(&update("x"));
        }
        assert!(matches!(result, Err(StreamError::Disconnected(_))));
    }

    #[test]
    fn test_stalled_writer_fails_fast() {
        struct Stalled(Receiver<()>);
        impl Write for Stalled {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                let _ = self.0.recv();
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let (release, gate) = bounded::<()>(0);
        let conn = WriterConnection::spawn(Stalled(gate), 1).unwrap();

        let start = Instant::now();
        let results: Vec<_> = (0..5).map(|i| conn.send(&update(&i.to_string()))).collect();
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StreamError::BufferFull(_)))));

        drop(release);
        assert!(conn.finish().is_some());
    }
}
