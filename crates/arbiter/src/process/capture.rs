//! Bounded capture of child output streams
//!
//! Bytes land in a buffer shared with the caller as they are read, so a
//! capture that has to be abandoned still yields everything read so far.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 8192;

/// How long capture tasks may keep running after the process tree is gone
pub(crate) const CAPTURE_GRACE: Duration = Duration::from_millis(500);

/// Bytes read from one stream
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub data: Vec<u8>,
    pub truncated: bool,
}

impl Captured {
    /// Append one chunk, keeping at most `cap` bytes overall
    fn push(&mut self, chunk: &[u8], cap: Option<usize>) {
        let room = cap.map_or(chunk.len(), |cap| cap.saturating_sub(self.data.len()));
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// A stream being drained by a background task
pub(crate) struct Capture {
    buffer: Arc<Mutex<Captured>>,
    task: JoinHandle<()>,
}

impl Capture {
    /// Start draining `reader`, keeping at most `cap` bytes
    ///
    /// Bytes past the cap are read and dropped so the writer never blocks on
    /// a full pipe.
    pub fn spawn<R>(reader: R, cap: Option<usize>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let task = tokio::spawn(drain(reader, cap, Arc::clone(&buffer)));
        Self { buffer, task }
    }

    fn take(&self) -> Captured {
        std::mem::take(&mut *lock(&self.buffer))
    }
}

fn lock(buffer: &Mutex<Captured>) -> MutexGuard<'_, Captured> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drain<R>(mut reader: R, cap: Option<usize>, buffer: Arc<Mutex<Captured>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "output stream read failed");
                break;
            }
        };
        lock(&buffer).push(&chunk[..n], cap);
    }
}

/// Wait for a capture to reach end of stream, giving up after [`CAPTURE_GRACE`]
///
/// On timeout the task is aborted and whatever it read so far is returned.
pub(crate) async fn join(capture: Option<Capture>, stream: &'static str) -> Captured {
    let Some(mut capture) = capture else {
        return Captured::default();
    };

    match tokio::time::timeout(CAPTURE_GRACE, &mut capture.task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(stream, error = %e, "capture task failed"),
        Err(_) => {
            warn!(stream, "pipe still held open after the process tree was killed");
            capture.task.abort();
        }
    }
    capture.take()
}
