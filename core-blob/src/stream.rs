//! # File Streams
//!
//! Event-driven handles over a file. Both variants deliver notifications to
//! listeners registered with `on_data`, `on_error` and `on_end`.
//!
//! - [`ReadStream`] reads nothing until [`ReadStream::open`] is called, then
//!   pushes encoded chunks from a spawned task, pausing `tick` between them.
//! - [`WriteStream`] decodes each `write` per its encoding and appends it to
//!   the file; `close` flushes and fires the end listeners.
//!
//! Listeners run on the task that produced the notification while the
//! listener table is locked, so a listener must not register further
//! listeners on the same stream.

use crate::encoding::{decode, Encoding, Payload, Utf8Decoder};
use crate::error::{BlobError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::FileSystemAccess;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Chunk size used when none is given.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Pause between chunks used when none is given.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

type DataListener = Box<dyn FnMut(Payload) + Send + 'static>;
type ErrorListener = Box<dyn FnMut(&BlobError) + Send + 'static>;
type EndListener = Box<dyn FnMut() + Send + 'static>;

#[derive(Default)]
struct Listeners {
    data: Vec<DataListener>,
    error: Vec<ErrorListener>,
    end: Vec<EndListener>,
}

#[derive(Clone, Default)]
struct SharedListeners(Arc<Mutex<Listeners>>);

impl SharedListeners {
    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_data(&self, chunk: Payload) {
        let mut listeners = self.lock();
        match listeners.data.len() {
            0 => {}
            1 => (listeners.data[0])(chunk),
            _ => {
                for listener in listeners.data.iter_mut() {
                    listener(chunk.clone());
                }
            }
        }
    }

    fn emit_error(&self, error: &BlobError) {
        for listener in self.lock().error.iter_mut() {
            listener(error);
        }
    }

    fn emit_end(&self) {
        for listener in self.lock().end.iter_mut() {
            listener();
        }
    }
}

/// Round a requested chunk size to one the encoding can emit cleanly.
///
/// Base64 chunks must be a multiple of 3 bytes so that their encodings
/// concatenate into the encoding of the whole file.
fn effective_buffer_size(buffer_size: usize, encoding: Encoding) -> usize {
    let size = buffer_size.max(1);
    match encoding {
        Encoding::Base64 => (size - size % 3).max(3),
        _ => size,
    }
}

/// Fill `buf` as far as the reader allows; a short count means end of file.
async fn read_chunk<R: AsyncRead + Unpin + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Readable file stream.
pub struct ReadStream {
    path: PathBuf,
    encoding: Encoding,
    buffer_size: usize,
    tick: Duration,
    fs: Arc<dyn FileSystemAccess>,
    listeners: SharedListeners,
    opened: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReadStream {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        path: impl Into<PathBuf>,
        encoding: Encoding,
        buffer_size: Option<usize>,
        tick: Option<Duration>,
    ) -> Result<Self> {
        if encoding == Encoding::Uri {
            return Err(BlobError::Encoding(
                "Read streams support utf8, ascii and base64".to_string(),
            ));
        }

        Ok(Self {
            path: path.into(),
            encoding,
            buffer_size: effective_buffer_size(buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE), encoding),
            tick: tick.unwrap_or(DEFAULT_TICK),
            fs,
            listeners: SharedListeners::default(),
            opened: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Effective chunk size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn on_data<F>(&self, listener: F) -> &Self
    where
        F: FnMut(Payload) + Send + 'static,
    {
        self.listeners.lock().data.push(Box::new(listener));
        self
    }

    pub fn on_error<F>(&self, listener: F) -> &Self
    where
        F: FnMut(&BlobError) + Send + 'static,
    {
        self.listeners.lock().error.push(Box::new(listener));
        self
    }

    pub fn on_end<F>(&self, listener: F) -> &Self
    where
        F: FnMut() + Send + 'static,
    {
        self.listeners.lock().end.push(Box::new(listener));
        self
    }

    /// Start reading. Must be called from within a tokio runtime.
    pub fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(BlobError::Stream(format!(
                "Read stream for {} is already open",
                self.path.display()
            )));
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BlobError::Runtime(format!("No async runtime to drive the stream: {}", e)))?;

        let reader = StreamReader {
            path: self.path.clone(),
            encoding: self.encoding,
            buffer_size: self.buffer_size,
            tick: self.tick,
            fs: self.fs.clone(),
            listeners: self.listeners.clone(),
        };
        let task = handle.spawn(reader.run());
        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);

        debug!(path = ?self.path, encoding = %self.encoding, buffer_size = self.buffer_size, "Opened read stream");
        Ok(())
    }

    /// Wait until the reader has delivered its end or error notification.
    pub async fn wait(&self) -> Result<()> {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| BlobError::Runtime(format!("Read stream task failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("path", &self.path)
            .field("encoding", &self.encoding)
            .field("buffer_size", &self.buffer_size)
            .field("tick", &self.tick)
            .field("opened", &self.opened.load(Ordering::SeqCst))
            .finish()
    }
}

struct StreamReader {
    path: PathBuf,
    encoding: Encoding,
    buffer_size: usize,
    tick: Duration,
    fs: Arc<dyn FileSystemAccess>,
    listeners: SharedListeners,
}

impl StreamReader {
    async fn run(self) {
        match self.pump().await {
            Ok(total) => {
                debug!(path = ?self.path, total, "Read stream finished");
                self.listeners.emit_end();
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Read stream failed");
                self.listeners.emit_error(&e);
            }
        }
    }

    async fn pump(&self) -> Result<u64> {
        let mut reader = self.fs.open_read_stream(&self.path).await?;
        let mut buf = vec![0u8; self.buffer_size];
        let mut utf8 = Utf8Decoder::new();
        let mut total = 0u64;

        loop {
            let n = read_chunk(&mut reader, &mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;

            let chunk = &buf[..n];
            let payload = match self.encoding {
                Encoding::Utf8 => Payload::Text(utf8.push(chunk)?),
                Encoding::Base64 => Payload::Text(STANDARD.encode(chunk)),
                Encoding::Ascii | Encoding::Uri => Payload::Bytes(chunk.to_vec()),
            };
            if !payload.is_empty() {
                self.listeners.emit_data(payload);
            }

            if n < buf.len() {
                break;
            }
            if !self.tick.is_zero() {
                tokio::time::sleep(self.tick).await;
            }
        }

        utf8.finish()?;
        Ok(total)
    }
}

/// Writable file stream.
pub struct WriteStream {
    path: PathBuf,
    encoding: Encoding,
    writer: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    listeners: SharedListeners,
    written: AtomicU64,
}

impl WriteStream {
    /// Open `path` for writing, truncating unless `append` is set.
    pub async fn open(
        fs: &dyn FileSystemAccess,
        path: impl Into<PathBuf>,
        encoding: Encoding,
        append: bool,
    ) -> Result<Self> {
        if encoding == Encoding::Uri {
            return Err(BlobError::Encoding(
                "Write streams support utf8, ascii and base64".to_string(),
            ));
        }

        let path = path.into();
        let writer = fs.open_write_stream(&path, append).await?;
        debug!(path = ?path, encoding = %encoding, append, "Opened write stream");

        Ok(Self {
            path,
            encoding,
            writer: tokio::sync::Mutex::new(Some(writer)),
            listeners: SharedListeners::default(),
            written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn on_data<F>(&self, listener: F) -> &Self
    where
        F: FnMut(Payload) + Send + 'static,
    {
        self.listeners.lock().data.push(Box::new(listener));
        self
    }

    pub fn on_error<F>(&self, listener: F) -> &Self
    where
        F: FnMut(&BlobError) + Send + 'static,
    {
        self.listeners.lock().error.push(Box::new(listener));
        self
    }

    pub fn on_end<F>(&self, listener: F) -> &Self
    where
        F: FnMut() + Send + 'static,
    {
        self.listeners.lock().end.push(Box::new(listener));
        self
    }

    /// Decode `data` and append it to the file.
    pub async fn write(&self, data: impl Into<Payload>) -> Result<()> {
        let result = self.write_inner(data.into()).await;
        if let Err(e) = &result {
            self.listeners.emit_error(e);
        }
        result
    }

    async fn write_inner(&self, data: Payload) -> Result<()> {
        let bytes = decode(&data, self.encoding)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            BlobError::Stream(format!("Write stream for {} is closed", self.path.display()))
        })?;

        writer.write_all(&bytes).await?;
        self.written.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    /// Flush and close the file. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();
        let Some(mut writer) = writer else {
            return Ok(());
        };

        if let Err(e) = writer.shutdown().await {
            let e = BlobError::from(e);
            self.listeners.emit_error(&e);
            return Err(e);
        }

        debug!(path = ?self.path, written = self.bytes_written(), "Closed write stream");
        self.listeners.emit_end();
        Ok(())
    }
}

impl std::fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStream")
            .field("path", &self.path)
            .field("encoding", &self.encoding)
            .field("written", &self.bytes_written())
            .finish()
    }
}
