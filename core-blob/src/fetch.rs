//! # Fetch Tasks
//!
//! Runs HTTP and local-file transfers whose bodies are blobs.
//!
//! ## Overview
//!
//! [`BlobFetcher::fetch`] returns a [`FetchTask`]: a future that resolves to
//! a [`FetchBlobResponse`] and can be decorated with progress observers
//! before it is awaited. Nothing happens until the task is first polled.
//!
//! ```rust,ignore
//! let response = fetcher
//!     .fetch(RequestConfig::default().file_cache(true), HttpMethod::Get, url, Headers::new(), RequestBody::Empty)
//!     .progress(|received, total| println!("{received}/{total:?}"))
//!     .await?;
//! println!("stored at {:?}", response.path());
//! ```
//!
//! ## Request bodies
//!
//! - A wrapped path (`RNFetchBlob-file://...`) uploads the file it names.
//! - Other text is base64-decoded when `Content-Type` ends in `;BASE64` or
//!   starts with `application/octet`, and sent as UTF-8 otherwise.
//! - Form fields become a `multipart/form-data` body.
//!
//! ## Response storage
//!
//! | Option | Destination |
//! |--------|-------------|
//! | `path` | that file, appended to when `overwrite` is false |
//! | `key` | `<cache>/<sha256(key)>[.ext]`, served from disk when present and no `path` is set |
//! | `file_cache` | `<cache>/RNFetchBlobTmp_<task id>[.ext]` |
//! | none | buffered in memory |
//!
//! ## Cancellation
//!
//! [`FetchTask::cancel`] stops the transfer at the next chunk boundary. A
//! partially written file is removed unless the task was appending to an
//! existing one.
//!
//! ## Timeouts
//!
//! `timeout` bounds how long a transfer may go without receiving data. A
//! slow download that keeps making progress is never cut off.

use crate::encoding::{decode, Encoding, Payload};
use crate::error::{BlobError, Result};
use crate::fs::Fs;
use crate::multipart::{FormField, MultipartBody};
use crate::progress::{ProgressCallback, ProgressOptions, ProgressReporter};
use crate::response::{
    FetchBlobResponse, Headers, ResponseBody, ResponseInfo, ResponseType, RnfbEncode, TaskState,
};
use crate::wrap;
use bridge_traits::{BridgeError, ByteStream, Clock, HttpBody, HttpClient, HttpMethod, HttpRequest};
use bytes::{Bytes, BytesMut};
use core_runtime::config::{BlobConfig, TransferDefaults};
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Upload chunk size for in-memory bodies, so upload progress has granularity.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Minimum spacing of progress events published on the event bus.
const EVENT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

const CACHE_FILE_PREFIX: &str = "RNFetchBlobTmp_";

fn default_true() -> bool {
    true
}

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    /// Store the response in a generated cache file
    #[serde(default)]
    pub file_cache: bool,
    /// Store the response at this path (may be wrapped)
    #[serde(default)]
    pub path: Option<String>,
    /// Extension for generated cache file names
    #[serde(default)]
    pub append_ext: Option<String>,
    /// Add the stored file to this session
    #[serde(default)]
    pub session: Option<String>,
    /// Android download-manager options; not applicable off-device
    #[serde(default)]
    pub add_android_downloads: Option<serde_json::Value>,
    /// Show the platform network activity indicator
    #[serde(default)]
    pub indicator: bool,
    /// Cache key; a response already cached under it is served from disk
    #[serde(default)]
    pub key: Option<String>,
    /// Request timeout in milliseconds
    #[serde(default, with = "timeout_millis")]
    pub timeout: Option<Duration>,
    /// Accept invalid TLS certificates
    #[serde(default)]
    pub trusty: bool,
    #[serde(default = "default_true")]
    pub follow_redirect: bool,
    /// Truncate `path` before writing instead of appending
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            file_cache: false,
            path: None,
            append_ext: None,
            session: None,
            add_android_downloads: None,
            indicator: false,
            key: None,
            timeout: None,
            trusty: false,
            follow_redirect: true,
            overwrite: true,
        }
    }
}

impl RequestConfig {
    pub fn file_cache(mut self, enabled: bool) -> Self {
        self.file_cache = enabled;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn append_ext(mut self, ext: impl Into<String>) -> Self {
        self.append_ext = Some(ext.into());
        self
    }

    pub fn session(mut self, name: impl Into<String>) -> Self {
        self.session = Some(name.into());
        self
    }

    pub fn add_android_downloads(mut self, options: serde_json::Value) -> Self {
        self.add_android_downloads = Some(options);
        self
    }

    pub fn indicator(mut self, show: bool) -> Self {
        self.indicator = show;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn trusty(mut self, trusty: bool) -> Self {
        self.trusty = trusty;
        self
    }

    pub fn follow_redirect(mut self, follow: bool) -> Self {
        self.follow_redirect = follow;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn extension(&self) -> String {
        match self.append_ext.as_deref().map(|e| e.trim_start_matches('.')) {
            Some(ext) if !ext.is_empty() => format!(".{}", ext),
            _ => String::new(),
        }
    }
}

mod timeout_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Wrapped path, base64 or plain text depending on `Content-Type`
    Text(String),
    Bytes(Vec<u8>),
    Multipart(Vec<FormField>),
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        RequestBody::Bytes(value)
    }
}

impl From<Vec<FormField>> for RequestBody {
    fn from(fields: Vec<FormField>) -> Self {
        RequestBody::Multipart(fields)
    }
}

/// File name for responses cached under `key`.
pub fn cache_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Whether a text body with this content type carries base64 data.
fn is_base64_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|c| {
        let c = c.to_ascii_lowercase();
        c.contains(";base64") || c.starts_with("application/octet")
    })
}

/// Drop the `;BASE64` marker so the server sees the real content type.
fn strip_base64_marker(headers: &mut Headers) {
    for value in headers
        .iter_mut()
        .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v)
    {
        if let Some(pos) = value.to_ascii_lowercase().find(";base64") {
            value.replace_range(pos..pos + ";base64".len(), "");
        }
    }
}

fn chunked(bytes: Bytes) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| Ok(bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len()))))
        .collect();
    stream::iter(chunks).boxed()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Download,
    Upload,
}

/// Feeds samples to the caller's reporter and to the event bus.
struct ProgressTracker {
    task_id: String,
    direction: Direction,
    user: Option<ProgressReporter>,
    events: ProgressReporter,
}

impl ProgressTracker {
    fn new(
        task_id: &str,
        direction: Direction,
        observer: Option<(ProgressOptions, ProgressCallback)>,
        bus: &EventBus,
        clock: &Arc<dyn Clock>,
    ) -> Self {
        let user = observer.map(|(options, callback)| ProgressReporter::new(options, callback, clock.clone()));

        let bus = bus.clone();
        let id = task_id.to_string();
        let publish: ProgressCallback = Box::new(move |done, total| {
            let event = match direction {
                Direction::Download => TransferEvent::Progress {
                    task_id: id.clone(),
                    received: done,
                    total,
                },
                Direction::Upload => TransferEvent::UploadProgress {
                    task_id: id.clone(),
                    written: done,
                    total,
                },
            };
            bus.emit(CoreEvent::Transfer(event)).ok();
        });

        Self {
            task_id: task_id.to_string(),
            direction,
            user,
            events: ProgressReporter::new(
                ProgressOptions::interval(EVENT_PROGRESS_INTERVAL),
                publish,
                clock.clone(),
            ),
        }
    }

    fn record(&mut self, done: u64, total: Option<u64>) {
        if let Some(user) = self.user.as_mut() {
            user.report(done, total);
        }
        self.events.report(done, total);
    }

    fn finish(&mut self, done: u64, total: Option<u64>) {
        debug!(task_id = %self.task_id, direction = ?self.direction, done, ?total, "Transfer progress complete");
        if let Some(user) = self.user.as_mut() {
            user.finish(done, total);
        }
        self.events.finish(done, total);
    }
}

/// Observers registered on a task before it starts.
struct Observers {
    download: Option<(ProgressOptions, ProgressCallback)>,
    upload: Option<(ProgressOptions, ProgressCallback)>,
    cancel: CancellationToken,
}

type Launch = Box<dyn FnOnce(Observers) -> BoxFuture<'static, Result<FetchBlobResponse>> + Send>;

/// A pending transfer: a future with progress observers and cancellation.
#[must_use = "fetch tasks do nothing unless awaited"]
pub struct FetchTask {
    task_id: String,
    cancel: CancellationToken,
    download: Option<(ProgressOptions, ProgressCallback)>,
    upload: Option<(ProgressOptions, ProgressCallback)>,
    launch: Option<Launch>,
    running: Option<BoxFuture<'static, Result<FetchBlobResponse>>>,
}

impl FetchTask {
    fn new(task_id: String, launch: Launch) -> Self {
        Self {
            task_id,
            cancel: CancellationToken::new(),
            download: None,
            upload: None,
            launch: Some(launch),
            running: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Observe download progress on every chunk.
    pub fn progress<F>(self, callback: F) -> Self
    where
        F: FnMut(u64, Option<u64>) + Send + 'static,
    {
        self.progress_with(ProgressOptions::default(), callback)
    }

    /// Observe download progress, throttled by `options`.
    pub fn progress_with<F>(mut self, options: ProgressOptions, callback: F) -> Self
    where
        F: FnMut(u64, Option<u64>) + Send + 'static,
    {
        self.download = Some((options, Box::new(callback)));
        self
    }

    /// Observe upload progress on every chunk.
    pub fn upload_progress<F>(self, callback: F) -> Self
    where
        F: FnMut(u64, Option<u64>) + Send + 'static,
    {
        self.upload_progress_with(ProgressOptions::default(), callback)
    }

    /// Observe upload progress, throttled by `options`.
    pub fn upload_progress_with<F>(mut self, options: ProgressOptions, callback: F) -> Self
    where
        F: FnMut(u64, Option<u64>) + Send + 'static,
    {
        self.upload = Some((options, Box::new(callback)));
        self
    }

    /// Stop the transfer; the task resolves to [`BlobError::Cancelled`].
    pub fn cancel(&self) {
        debug!(task_id = %self.task_id, "Cancellation requested");
        self.cancel.cancel();
    }

    /// Token that cancels this task, for use from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }
}

impl Future for FetchTask {
    type Output = Result<FetchBlobResponse>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.running.is_none() {
            let Some(launch) = this.launch.take() else {
                return Poll::Ready(Err(BlobError::Runtime(format!(
                    "Task {} was polled after completion",
                    this.task_id
                ))));
            };
            let observers = Observers {
                download: this.download.take(),
                upload: this.upload.take(),
                cancel: this.cancel.clone(),
            };
            this.running = Some(launch(observers));
        }

        match this.running.as_mut() {
            Some(running) => {
                let result = running.as_mut().poll(cx);
                if result.is_ready() {
                    this.running = None;
                }
                result
            }
            None => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchTask")
            .field("task_id", &self.task_id)
            .field("started", &self.running.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Everything a task needs once launched.
struct TaskContext {
    task_id: String,
    config: RequestConfig,
    method: HttpMethod,
    url: String,
    headers: Headers,
    body: RequestBody,
}

/// Destination of a response body.
enum Sink {
    Memory(BytesMut),
    File {
        path: PathBuf,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        /// Remove the file if the transfer does not complete
        discard_on_failure: bool,
    },
}

impl Sink {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            Sink::Memory(buffer) => buffer.extend_from_slice(chunk),
            Sink::File { writer, .. } => writer.write_all(chunk).await?,
        }
        Ok(())
    }

    async fn finish(self) -> Result<ResponseBody> {
        match self {
            Sink::Memory(buffer) => Ok(ResponseBody::Buffered(buffer.freeze())),
            Sink::File { path, mut writer, .. } => {
                writer.shutdown().await?;
                Ok(ResponseBody::Stored(path))
            }
        }
    }

    async fn discard(self, fs: &Fs) {
        if let Sink::File {
            path,
            writer,
            discard_on_failure: true,
        } = self
        {
            drop(writer);
            match fs.access().delete_file(&path).await {
                Ok(()) => debug!(path = ?path, "Removed partial download"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove partial download"),
            }
        }
    }
}

/// Runs fetch tasks against the configured bridges.
#[derive(Clone)]
pub struct BlobFetcher {
    http: Arc<dyn HttpClient>,
    fs: Fs,
    events: EventBus,
    clock: Arc<dyn Clock>,
    defaults: TransferDefaults,
}

impl BlobFetcher {
    pub fn new(config: &BlobConfig, fs: Fs) -> Self {
        Self {
            http: config.http_client.clone(),
            events: fs.events().clone(),
            fs,
            clock: config.clock.clone(),
            defaults: config.transfer,
        }
    }

    pub fn fs(&self) -> &Fs {
        &self.fs
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn emit(&self, event: TransferEvent) {
        self.events.emit(CoreEvent::Transfer(event)).ok();
    }

    fn new_task_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Start building an HTTP transfer.
    pub fn fetch(
        &self,
        config: RequestConfig,
        method: HttpMethod,
        url: impl Into<String>,
        headers: Headers,
        body: RequestBody,
    ) -> FetchTask {
        let ctx = TaskContext {
            task_id: Self::new_task_id(),
            config,
            method,
            url: url.into(),
            headers,
            body,
        };
        let task_id = ctx.task_id.clone();
        let fetcher = self.clone();
        FetchTask::new(
            task_id,
            Box::new(move |observers: Observers| fetcher.launch(ctx, observers, false)),
        )
    }

    /// Start building a transfer against the local filesystem.
    ///
    /// `url` must be a `file://` URI or a wrapped path. `GET` reads the file,
    /// `POST` and `PUT` write `body` into it.
    pub fn fetch_file(
        &self,
        config: RequestConfig,
        method: HttpMethod,
        url: impl Into<String>,
        headers: Headers,
        body: RequestBody,
    ) -> FetchTask {
        let ctx = TaskContext {
            task_id: Self::new_task_id(),
            config,
            method,
            url: url.into(),
            headers,
            body,
        };
        let task_id = ctx.task_id.clone();
        let fetcher = self.clone();
        FetchTask::new(
            task_id,
            Box::new(move |observers: Observers| fetcher.launch(ctx, observers, true)),
        )
    }

    fn launch(
        self,
        ctx: TaskContext,
        observers: Observers,
        local: bool,
    ) -> BoxFuture<'static, Result<FetchBlobResponse>> {
        let span = tracing::info_span!(
            "fetch",
            task_id = %ctx.task_id,
            method = %ctx.method,
            local
        );

        async move {
            let task_id = ctx.task_id.clone();
            self.emit(TransferEvent::Started {
                task_id: task_id.clone(),
                method: ctx.method.to_string(),
                url: ctx.url.clone(),
            });

            let cancel = observers.cancel.clone();
            let result = if cancel.is_cancelled() {
                Err(BlobError::Cancelled {
                    task_id: task_id.clone(),
                })
            } else if local {
                self.run_file(ctx, observers).await
            } else {
                self.run_http(ctx, observers).await
            };

            match &result {
                Ok(response) => {
                    info!(
                        status = response.status(),
                        stored = ?response.path(),
                        "Transfer completed"
                    );
                }
                Err(BlobError::Cancelled { .. }) => {
                    info!("Transfer cancelled");
                    self.emit(TransferEvent::Cancelled { task_id });
                }
                Err(e) => {
                    warn!(error = %e, "Transfer failed");
                    self.emit(TransferEvent::Failed {
                        task_id,
                        message: e.to_string(),
                    });
                }
            }
            result
        }
        .instrument(span)
        .boxed()
    }

    fn cancelled(task_id: &str) -> BlobError {
        BlobError::Cancelled {
            task_id: task_id.to_string(),
        }
    }

    /// Where the response body should be written, if anywhere.
    fn storage_target(&self, ctx: &TaskContext) -> Option<PathBuf> {
        let config = &ctx.config;
        if let Some(path) = &config.path {
            return Some(self.fs.resolve(path));
        }
        if let Some(key) = &config.key {
            return Some(self.key_path(key, config));
        }
        if config.file_cache {
            return Some(self.fs.dirs().cache.join(format!(
                "{}{}{}",
                CACHE_FILE_PREFIX,
                ctx.task_id,
                config.extension()
            )));
        }
        None
    }

    fn key_path(&self, key: &str, config: &RequestConfig) -> PathBuf {
        self.fs
            .dirs()
            .cache
            .join(format!("{}{}", cache_key(key), config.extension()))
    }

    async fn open_sink(&self, target: Option<PathBuf>, overwrite: bool) -> Result<Sink> {
        match target {
            None => Ok(Sink::Memory(BytesMut::new())),
            Some(path) => {
                let append = !overwrite && self.fs.access().exists(&path).await?;
                let writer = self.fs.access().open_write_stream(&path, append).await?;
                Ok(Sink::File {
                    path,
                    writer,
                    discard_on_failure: !append,
                })
            }
        }
    }

    fn track_session(&self, config: &RequestConfig, body: &ResponseBody) {
        if let (Some(name), ResponseBody::Stored(path)) = (&config.session, body) {
            self.fs.session(name).add(path.clone());
        }
    }

    fn respond(&self, info: ResponseInfo, body: ResponseBody) -> FetchBlobResponse {
        let stored = match &body {
            ResponseBody::Stored(path) => Some(path.to_string_lossy().into_owned()),
            ResponseBody::Buffered(_) => None,
        };
        let bytes = match &body {
            ResponseBody::Buffered(bytes) => bytes.len() as u64,
            ResponseBody::Stored(_) => 0,
        };
        self.emit(TransferEvent::Completed {
            task_id: info.task_id.clone(),
            status: info.status,
            bytes,
            path: stored,
        });
        FetchBlobResponse::new(info, body, self.fs.clone())
    }

    // ------------------------------------------------------------------
    // HTTP transfers
    // ------------------------------------------------------------------

    async fn run_http(&self, mut ctx: TaskContext, observers: Observers) -> Result<FetchBlobResponse> {
        let Observers {
            download,
            upload,
            cancel,
        } = observers;

        if let Some(options) = &ctx.config.add_android_downloads {
            debug!(?options, "Download manager options have no effect on this platform");
        }
        if ctx.config.indicator {
            debug!("Network activity indicator is not available on this platform");
        }

        // `path` outranks `key` as the storage target, so only a key that
        // decides where the body lands can be served from disk.
        if let Some(key) = ctx.config.key.clone().filter(|_| ctx.config.path.is_none()) {
            let cached = self.key_path(&key, &ctx.config);
            if self.fs.access().exists(&cached).await? {
                debug!(path = ?cached, "Serving response from cache");
                return Ok(self.cached_response(&ctx, cached));
            }
        }

        let body = std::mem::take(&mut ctx.body);
        let upload_tracker = Arc::new(Mutex::new(ProgressTracker::new(
            &ctx.task_id,
            Direction::Upload,
            upload,
            &self.events,
            &self.clock,
        )));
        let (http_body, upload_total) = self
            .prepare_body(&ctx.task_id, &mut ctx.headers, body, upload_tracker.clone())
            .await?;

        let idle_timeout = ctx.config.timeout.unwrap_or(self.defaults.timeout);
        let mut request = HttpRequest::new(ctx.method, ctx.url.clone())
            .headers(ctx.headers.clone())
            .body(http_body)
            .timeout(idle_timeout)
            .follow_redirects(ctx.config.follow_redirect)
            .trust_all_certificates(ctx.config.trusty);
        if request.body.is_empty() {
            request.headers.retain(|k, _| !k.eq_ignore_ascii_case("content-length"));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Self::cancelled(&ctx.task_id)),
            response = self.http.send(request) => response?,
        };

        if let Some(total) = upload_total.filter(|total| *total > 0) {
            lock(&upload_tracker).finish(total, Some(total));
        }

        self.emit(TransferEvent::StateChanged {
            task_id: ctx.task_id.clone(),
            state: TaskState::Running.code(),
            status: response.status,
        });
        debug!(status = response.status, length = ?response.content_length, "Response headers received");

        let status = response.status;
        let headers = response.headers;
        let final_url = response.final_url;
        let total = response.content_length;
        let mut body = response.body;

        let target = self.storage_target(&ctx);
        let mut sink = self.open_sink(target, ctx.config.overwrite).await?;
        let mut tracker = ProgressTracker::new(
            &ctx.task_id,
            Direction::Download,
            download,
            &self.events,
            &self.clock,
        );

        let mut received = 0u64;
        let transfer: Result<()> = async {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Self::cancelled(&ctx.task_id)),
                    next = tokio::time::timeout(idle_timeout, body.next()) => {
                        next.map_err(|_| BlobError::Bridge(BridgeError::Timeout))?
                    }
                };
                let Some(chunk) = next else {
                    return Ok(());
                };
                let chunk = chunk.map_err(|e| BlobError::Http(format!("Response body failed: {}", e)))?;
                received += chunk.len() as u64;
                sink.write(&chunk).await?;
                tracker.record(received, total);
            }
        }
        .await;

        if let Err(e) = transfer {
            sink.discard(&self.fs).await;
            return Err(e);
        }

        tracker.finish(received, total.or(Some(received)));
        let stored = sink.finish().await?;

        let resp_type = ResponseType::from_content_type(header_value(&headers, "content-type"));
        let rnfb_encode = match &stored {
            ResponseBody::Stored(_) => RnfbEncode::Path,
            ResponseBody::Buffered(bytes) => RnfbEncode::for_buffered(&headers, resp_type, bytes),
        };

        let mut redirects = vec![ctx.url.clone()];
        if !final_url.is_empty() && final_url != ctx.url {
            redirects.push(final_url);
        }

        self.track_session(&ctx.config, &stored);
        let info = ResponseInfo {
            task_id: ctx.task_id.clone(),
            state: TaskState::Completed,
            headers,
            status,
            resp_type,
            rnfb_encode,
            redirects,
        };
        Ok(self.respond(info, stored))
    }

    fn cached_response(&self, ctx: &TaskContext, path: PathBuf) -> FetchBlobResponse {
        let body = ResponseBody::Stored(path);
        self.track_session(&ctx.config, &body);
        let info = ResponseInfo {
            task_id: ctx.task_id.clone(),
            state: TaskState::Completed,
            headers: Headers::new(),
            status: 200,
            resp_type: ResponseType::Blob,
            rnfb_encode: RnfbEncode::Path,
            redirects: vec![ctx.url.clone()],
        };
        self.respond(info, body)
    }

    /// Turn a request body into a progress-counted stream.
    async fn prepare_body(
        &self,
        task_id: &str,
        headers: &mut Headers,
        body: RequestBody,
        tracker: Arc<Mutex<ProgressTracker>>,
    ) -> Result<(HttpBody, Option<u64>)> {
        let (stream, length): (ByteStream, u64) = match body {
            RequestBody::Empty => return Ok((HttpBody::Empty, None)),
            RequestBody::Text(text) if wrap::is_wrapped(&text) || wrap::is_asset(&text) => {
                let path = self.fs.resolve(&text);
                let meta = self.fs.access().metadata(&path).await?;
                let reader = self.fs.access().open_read_stream(&path).await?;
                debug!(path = ?path, size = meta.size, "Uploading file body");
                (ReaderStream::new(reader).boxed(), meta.size)
            }
            RequestBody::Text(text) => {
                let bytes = if is_base64_content_type(header_value(headers, "content-type")) {
                    strip_base64_marker(headers);
                    decode(&Payload::Text(text), Encoding::Base64)?
                } else {
                    text.into_bytes()
                };
                let len = bytes.len() as u64;
                (chunked(Bytes::from(bytes)), len)
            }
            RequestBody::Bytes(bytes) => {
                let len = bytes.len() as u64;
                (chunked(Bytes::from(bytes)), len)
            }
            RequestBody::Multipart(fields) => {
                let form = MultipartBody::build(&fields, MultipartBody::boundary_for(task_id), &self.fs).await?;
                headers.retain(|k, _| !k.eq_ignore_ascii_case("content-type"));
                headers.insert("Content-Type".to_string(), form.content_type());
                let len = form.len();
                (form.into_stream(&self.fs), len)
            }
        };

        let mut sent = 0u64;
        let counted = stream
            .inspect_ok(move |chunk| {
                sent += chunk.len() as u64;
                lock(&tracker).record(sent, Some(length));
            })
            .boxed();

        Ok((
            HttpBody::Stream {
                stream: counted,
                length: Some(length),
            },
            Some(length),
        ))
    }

    // ------------------------------------------------------------------
    // Local-file transfers
    // ------------------------------------------------------------------

    async fn run_file(&self, mut ctx: TaskContext, observers: Observers) -> Result<FetchBlobResponse> {
        if !wrap::is_file_uri(&ctx.url) && !wrap::is_asset(&ctx.url) {
            return Err(BlobError::InvalidUri(format!(
                "{} is not a file URI",
                ctx.url
            )));
        }
        let path = self.fs.resolve(&ctx.url);

        match ctx.method {
            HttpMethod::Get => self.read_local(&ctx, &path, observers).await,
            HttpMethod::Post | HttpMethod::Put => {
                let body = std::mem::take(&mut ctx.body);
                self.write_local(&ctx, &path, body, observers).await
            }
            other => Err(BlobError::Unsupported(format!(
                "{} is not supported for file URIs",
                other
            ))),
        }
    }

    async fn read_local(&self, ctx: &TaskContext, path: &Path, observers: Observers) -> Result<FetchBlobResponse> {
        let encoding = match header_value(&ctx.headers, "encoding") {
            Some(value) => value.parse::<Encoding>()?,
            None => Encoding::Utf8,
        };
        if encoding == Encoding::Uri {
            return Err(BlobError::Encoding(
                "Local reads support utf8, ascii and base64".to_string(),
            ));
        }
        let buffer_size = match header_value(&ctx.headers, "bufferSize") {
            Some(value) => value.trim().parse::<usize>().map_err(|e| {
                BlobError::InvalidArgument(format!("Invalid bufferSize '{}': {}", value, e))
            })?,
            None => self.defaults.file_fetch_buffer_size,
        }
        .max(1);

        let meta = self.fs.access().metadata(path).await?;
        let total = meta.size;
        let mut reader = self.fs.access().open_read_stream(path).await?;

        self.emit(TransferEvent::StateChanged {
            task_id: ctx.task_id.clone(),
            state: TaskState::Running.code(),
            status: 200,
        });

        let mut sink = self.open_sink(self.storage_target(ctx), ctx.config.overwrite).await?;
        let mut tracker = ProgressTracker::new(
            &ctx.task_id,
            Direction::Download,
            observers.download,
            &self.events,
            &self.clock,
        );

        let copied = self
            .pump_local(&ctx.task_id, &mut reader, &mut sink, buffer_size, total, &mut tracker, &observers.cancel)
            .await;
        let read = match copied {
            Ok(read) => read,
            Err(e) => {
                sink.discard(&self.fs).await;
                return Err(e);
            }
        };
        tracker.finish(read, Some(total.max(read)));

        let stored = sink.finish().await?;
        let rnfb_encode = match &stored {
            ResponseBody::Stored(_) => RnfbEncode::Path,
            ResponseBody::Buffered(bytes) => {
                if encoding == Encoding::Utf8 && std::str::from_utf8(bytes).is_err() {
                    return Err(BlobError::Encoding(format!(
                        "{} is not valid UTF-8",
                        path.display()
                    )));
                }
                RnfbEncode::from(encoding)
            }
        };
        self.track_session(&ctx.config, &stored);

        let info = ResponseInfo {
            task_id: ctx.task_id.clone(),
            state: TaskState::Completed,
            headers: Headers::new(),
            status: 200,
            resp_type: ResponseType::Blob,
            rnfb_encode,
            redirects: vec![ctx.url.clone()],
        };
        Ok(self.respond(info, stored))
    }

    #[allow(clippy::too_many_arguments)]
    async fn pump_local(
        &self,
        task_id: &str,
        reader: &mut Box<dyn AsyncRead + Send + Unpin>,
        sink: &mut Sink,
        buffer_size: usize,
        total: u64,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut buf = vec![0u8; buffer_size];
        let mut read = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(Self::cancelled(task_id));
            }
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(read);
            }
            read += n as u64;
            sink.write(&buf[..n]).await?;
            tracker.record(read, Some(total));

            if read < total && !self.defaults.file_fetch_tick.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Self::cancelled(task_id)),
                    _ = tokio::time::sleep(self.defaults.file_fetch_tick) => {}
                }
            }
        }
    }

    async fn write_local(
        &self,
        ctx: &TaskContext,
        path: &Path,
        body: RequestBody,
        observers: Observers,
    ) -> Result<FetchBlobResponse> {
        if observers.cancel.is_cancelled() {
            return Err(Self::cancelled(&ctx.task_id));
        }

        let encoding = match header_value(&ctx.headers, "encoding") {
            Some(value) => value.parse::<Encoding>()?,
            None => Encoding::Utf8,
        };

        let written = match body {
            RequestBody::Empty => {
                self.fs.access().write_file(path, Bytes::new()).await?;
                0
            }
            RequestBody::Text(text) if wrap::is_wrapped(&text) || wrap::is_asset(&text) => {
                self.fs.access().copy(&self.fs.resolve(&text), path).await?
            }
            RequestBody::Text(text) => {
                let bytes = match encoding {
                    Encoding::Uri => {
                        return Err(BlobError::Encoding(
                            "Use a wrapped path to copy a file".to_string(),
                        ))
                    }
                    other => decode(&Payload::Text(text), other)?,
                };
                let len = bytes.len() as u64;
                self.fs.access().write_file(path, Bytes::from(bytes)).await?;
                len
            }
            RequestBody::Bytes(bytes) => {
                let len = bytes.len() as u64;
                self.fs.access().write_file(path, Bytes::from(bytes)).await?;
                len
            }
            RequestBody::Multipart(_) => {
                return Err(BlobError::Unsupported(
                    "Multipart bodies cannot be written to a file URI".to_string(),
                ))
            }
        };

        let mut tracker = ProgressTracker::new(
            &ctx.task_id,
            Direction::Upload,
            observers.upload,
            &self.events,
            &self.clock,
        );
        tracker.finish(written, Some(written));

        let stored = ResponseBody::Stored(path.to_path_buf());
        self.track_session(&ctx.config, &stored);
        let info = ResponseInfo {
            task_id: ctx.task_id.clone(),
            state: TaskState::Completed,
            headers: Headers::new(),
            status: 200,
            resp_type: ResponseType::Blob,
            rnfb_encode: RnfbEncode::Path,
            redirects: vec![ctx.url.clone()],
        };
        Ok(self.respond(info, stored))
    }
}

impl std::fmt::Debug for BlobFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobFetcher")
            .field("fs", &self.fs)
            .field("defaults", &self.defaults)
            .finish()
    }
}
