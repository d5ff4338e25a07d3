//! Child process output handling
//!
//! Each output stream of a managed process gets a pump task that copies raw
//! chunks to the caller's sink and into a rolling buffer. The buffer is
//! searched for the readiness marker after every chunk; nothing assumes the
//! child writes whole lines.

use memchr::memmem;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes of combined output retained for diagnostics
pub const COMBINED_CAPACITY: usize = 64 * 1024;

/// Bytes of each stream retained for marker matching across chunks
const STREAM_WINDOW: usize = 4 * 1024;

/// Bytes of output attached to early-exit errors
pub const TAIL_LEN: usize = 2 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Destination for a child's output stream
#[derive(Clone, Default)]
pub struct OutputSink {
    writer: Option<Arc<Mutex<dyn Write + Send>>>,
}

impl OutputSink {
    /// Drop everything (the output is still scanned for readiness)
    pub fn discard() -> Self {
        Self::default()
    }

    /// Forward to this process's stdout
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    /// Forward to this process's stderr
    pub fn stderr() -> Self {
        Self::from_writer(std::io::stderr())
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        let writer: Arc<Mutex<dyn Write + Send>> = Arc::new(Mutex::new(writer));
        Self { writer: Some(writer) }
    }

    /// A sink whose contents can be read back through the returned buffer
    pub fn capture() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    pub fn is_discard(&self) -> bool {
        self.writer.is_none()
    }

    fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        match &self.writer {
            Some(writer) => writer.lock().unwrap_or_else(|p| p.into_inner()).write_all(bytes),
            None => Ok(()),
        }
    }

    /// Flush buffered data; errors are logged since teardown must not fail on them
    pub fn flush(&self) {
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.lock().unwrap_or_else(|p| p.into_inner()).flush() {
                debug!("failed to flush output sink: {}", e);
            }
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.writer {
            Some(_) => f.write_str("OutputSink(writer)"),
            None => f.write_str("OutputSink(discard)"),
        }
    }
}

/// In-memory writer that can be shared with an [`OutputSink`]
#[derive(Clone, Default, Debug)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().unwrap_or_else(|p| p.into_inner())).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout = 0,
    Stderr = 1,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Rolling record of a child's output plus readiness-marker detection
#[derive(Debug)]
pub struct OutputBuffer {
    combined: Vec<u8>,
    windows: [Vec<u8>; 2],
    marker: Option<Vec<u8>>,
    ready_line: Option<String>,
}

impl OutputBuffer {
    pub fn new(marker: Option<&str>) -> Self {
        Self {
            combined: Vec::new(),
            windows: [Vec::new(), Vec::new()],
            marker: marker.filter(|m| !m.is_empty()).map(|m| m.as_bytes().to_vec()),
            ready_line: None,
        }
    }

    /// Record a chunk; returns true the first time the marker shows up
    pub fn push(&mut self, stream: Stream, chunk: &[u8]) -> bool {
        append_capped(&mut self.combined, chunk, COMBINED_CAPACITY);

        if self.ready_line.is_some() {
            return false;
        }
        let Some(marker) = &self.marker else {
            return false;
        };

        let window = &mut self.windows[stream as usize];
        let keep = STREAM_WINDOW.max(marker.len());
        append_capped(window, chunk, keep);

        match memmem::find(window, marker) {
            Some(pos) => {
                self.ready_line = Some(line_around(window, pos));
                true
            }
            None => false,
        }
    }

    /// The output line that contained the marker, once seen
    pub fn ready_line(&self) -> Option<&str> {
        self.ready_line.as_deref()
    }

    /// The last `len` bytes of combined output
    pub fn tail(&self, len: usize) -> String {
        let start = self.combined.len().saturating_sub(len);
        String::from_utf8_lossy(&self.combined[start..]).into_owned()
    }

    /// Everything still retained
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }
}

fn append_capped(buffer: &mut Vec<u8>, chunk: &[u8], cap: usize) {
    buffer.extend_from_slice(chunk);
    if buffer.len() > cap {
        let excess = buffer.len() - cap;
        buffer.drain(..excess);
    }
}

fn line_around(window: &[u8], pos: usize) -> String {
    let start = window[..pos].iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let end = window[pos..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(window.len(), |i| pos + i);
    String::from_utf8_lossy(&window[start..end]).trim_end_matches('\r').to_string()
}

pub type SharedOutput = Arc<Mutex<OutputBuffer>>;

pub fn lock(output: &SharedOutput) -> MutexGuard<'_, OutputBuffer> {
    output.lock().unwrap_or_else(|p| p.into_inner())
}

/// Copy `reader` into `sink` and `output` until EOF, raising `ready` when the marker appears
pub fn spawn_pump<R>(
    mut reader: R,
    stream: Stream,
    sink: OutputSink,
    output: SharedOutput,
    ready: Arc<watch::Sender<bool>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut sink_failed = false;

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("{} pump stopped: {}", stream, e);
                    break;
                }
            };

            if !sink_failed {
                if let Err(e) = sink.write_all(&chunk[..n]) {
                    warn!("⚠️ Failed to forward child {}: {}", stream, e);
                    sink_failed = true;
                }
            }

            if lock(&output).push(stream, &chunk[..n]) {
                ready.send_replace(true);
            }
        }

        sink.flush();
    })
}

/// Resolve once the marker has been seen; never resolves if the pumps end first
pub async fn marker_seen(mut ready: watch::Receiver<bool>) {
    if ready.wait_for(|seen| *seen).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_marker_found_in_single_chunk() {
        let mut buffer = OutputBuffer::new(Some("ready on"));
        assert!(!buffer.push(Stream::Stdout, b"booting\n"));
        assert!(buffer.push(Stream::Stdout, b"ready on :0\nmore\n"));
        assert_eq!(buffer.ready_line(), Some("ready on :0"));
        // only reported once
        assert!(!buffer.push(Stream::Stdout, b"ready on :1\n"));
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut buffer = OutputBuffer::new(Some("serving insecure client requests on "));
        assert!(!buffer.push(Stream::Stderr, b"2024 I | embed: serving insecure cli"));
        assert!(buffer.push(Stream::Stderr, b"ent requests on 127.0.0.1:2379"));
        assert_eq!(
            buffer.ready_line(),
            Some("2024 I | embed: serving insecure client requests on 127.0.0.1:2379")
        );
    }

    #[test]
    fn test_streams_do_not_splice_markers() {
        let mut buffer = OutputBuffer::new(Some("ready on"));
        assert!(!buffer.push(Stream::Stdout, b"rea"));
        assert!(!buffer.push(Stream::Stderr, b"dy on"));
    }

    #[test]
    fn test_no_marker_never_ready() {
        let mut buffer = OutputBuffer::new(None);
        assert!(!buffer.push(Stream::Stdout, b"ready on :0\n"));
        assert_eq!(buffer.ready_line(), None);
        assert_eq!(buffer.contents(), "ready on :0\n");
    }

    #[test]
    fn test_combined_output_is_capped_to_newest_bytes() {
        let mut buffer = OutputBuffer::new(None);
        buffer.push(Stream::Stdout, &vec![b'a'; COMBINED_CAPACITY]);
        buffer.push(Stream::Stderr, b"the end");
        assert_eq!(buffer.contents().len(), COMBINED_CAPACITY);
        assert!(buffer.tail(7).ends_with("the end"));
        assert_eq!(buffer.tail(3), "end");
    }

    #[test]
    fn test_capture_sink_collects_writes() {
        let (sink, captured) = OutputSink::capture();
        sink.write_all(b"hello ").unwrap();
        sink.write_all(b"world").unwrap();
        sink.flush();
        assert_eq!(captured.contents(), "hello world");
        assert!(!sink.is_discard());
        assert!(OutputSink::discard().is_discard());
    }

    #[tokio::test]
    async fn test_pump_forwards_and_signals() {
        let (sink, captured) = OutputSink::capture();
        let output: SharedOutput = Arc::new(Mutex::new(OutputBuffer::new(Some("ready"))));
        let (tx, rx) = watch::channel(false);

        let reader: &'static [u8] = b"starting\nready now\n";
        let handle = spawn_pump(reader, Stream::Stdout, sink, output.clone(), Arc::new(tx));

        tokio::time::timeout(Duration::from_secs(1), marker_seen(rx))
            .await
            .expect("marker should be seen");
        handle.await.unwrap();

        assert_eq!(captured.contents(), "starting\nready now\n");
        assert_eq!(lock(&output).ready_line(), Some("ready now"));
    }

    #[tokio::test]
    async fn test_marker_seen_pends_when_pumps_end_without_marker() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let result = tokio::time::timeout(Duration::from_millis(50), marker_seen(rx)).await;
        assert!(result.is_err());
    }
}
