//! # Filesystem Facade
//!
//! [`Fs`] exposes file operations over the injected
//! [`FileSystemAccess`] bridge using the conventions callers expect:
//!
//! - Paths are strings and may be wrapped (`RNFetchBlob-file://`),
//!   `file://` URIs or `bundle-assets://` references; all are resolved to
//!   plain filesystem paths before use.
//! - File contents travel as [`Payload`]s tagged with an [`Encoding`].
//! - Writes report the number of bytes stored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let fs = fetch_blob.fs();
//! let path = fs.dirs().document.join("notes.txt");
//! let path = path.to_string_lossy();
//!
//! fs.write_file(&path, "hello".into(), Encoding::Utf8).await?;
//! let text = fs.read_file(&path, Encoding::Utf8, None).await?;
//! ```

use crate::encoding::{decode, encode, Encoding, Payload};
use crate::error::{BlobError, Result};
use crate::session::{Session, SessionRegistry};
use crate::stream::{ReadStream, WriteStream};
use crate::wrap::{self, ASSET_PREFIX};
use bridge_traits::{
    BridgeError, DiskSpace, FileKind, FileMetadata, FileSystemAccess, MediaScanner,
    PlatformDirectories, ScanEntry,
};
use bytes::{Bytes, BytesMut};
use core_runtime::config::{BlobConfig, TransferDefaults};
use core_runtime::events::EventBus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

/// File information returned by `stat` and `lstat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobFile {
    pub size: u64,
    pub filename: String,
    pub path: String,
    /// Milliseconds since the Unix epoch, 0 when unknown
    pub last_modified: i64,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl From<FileMetadata> for BlobFile {
    fn from(meta: FileMetadata) -> Self {
        Self {
            size: meta.size,
            filename: meta.name,
            path: meta.path.to_string_lossy().into_owned(),
            last_modified: meta.modified_at_ms.unwrap_or(0),
            kind: meta.kind,
        }
    }
}

/// Filesystem facade.
#[derive(Clone)]
pub struct Fs {
    access: Arc<dyn FileSystemAccess>,
    dirs: PlatformDirectories,
    asset_dir: PathBuf,
    app_groups: HashMap<String, PathBuf>,
    media_scanner: Option<Arc<dyn MediaScanner>>,
    sessions: SessionRegistry,
    events: EventBus,
    defaults: TransferDefaults,
}

impl Fs {
    /// Build the facade from a runtime configuration, using the global
    /// session registry.
    pub fn new(config: &BlobConfig, events: EventBus) -> Self {
        Self {
            access: config.file_system.clone(),
            dirs: config.directories.clone(),
            asset_dir: config.asset_dir.clone(),
            app_groups: config.app_groups.clone(),
            media_scanner: config.media_scanner.clone(),
            sessions: SessionRegistry::global(),
            events,
            defaults: config.transfer,
        }
    }

    /// Use a private session registry instead of the global one.
    pub fn with_sessions(mut self, sessions: SessionRegistry) -> Self {
        self.sessions = sessions;
        self
    }

    /// The underlying bridge.
    pub fn access(&self) -> &Arc<dyn FileSystemAccess> {
        &self.access
    }

    pub fn dirs(&self) -> &PlatformDirectories {
        &self.dirs
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn defaults(&self) -> &TransferDefaults {
        &self.defaults
    }

    /// Open a session by name; it publishes on this facade's event bus.
    pub fn session(&self, name: &str) -> Session {
        self.sessions.session(name).with_events(self.events.clone())
    }

    pub fn asset(&self, path: &str) -> String {
        wrap::asset(path)
    }

    /// Map any accepted path form to a plain filesystem path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        if let Some(asset) = path.strip_prefix(ASSET_PREFIX) {
            return self.asset_dir.join(asset.trim_start_matches('/'));
        }
        match wrap::unwrap_file_uri(path) {
            Some(bare) => PathBuf::from(bare),
            None => PathBuf::from(path),
        }
    }

    /// Create a file; fails if anything already exists at `path`.
    ///
    /// With [`Encoding::Uri`], `data` names a file whose contents are copied.
    #[instrument(skip(self, data), fields(encoding = %encoding))]
    pub async fn create_file(&self, path: &str, data: Payload, encoding: Encoding) -> Result<()> {
        let target = self.resolve(path);
        if self.access.exists(&target).await? {
            return Err(BridgeError::AlreadyExists(target).into());
        }

        match encoding {
            Encoding::Uri => {
                let source = self.uri_source(&data)?;
                self.access.copy(&source, &target).await?;
            }
            _ => {
                let bytes = decode(&data, encoding)?;
                self.access.write_file(&target, Bytes::from(bytes)).await?;
            }
        }
        Ok(())
    }

    /// Read a whole file.
    ///
    /// `buffer_size` bounds the read chunk size; by default the file is read
    /// in one call.
    #[instrument(skip(self), fields(encoding = %encoding))]
    pub async fn read_file(
        &self,
        path: &str,
        encoding: Encoding,
        buffer_size: Option<usize>,
    ) -> Result<Payload> {
        let target = self.resolve(path);
        let bytes = match buffer_size {
            None => self.access.read_file(&target).await?,
            Some(size) => self.read_chunked(&target, size.max(1)).await?,
        };
        encode(&bytes, encoding)
    }

    async fn read_chunked(&self, path: &Path, chunk_size: usize) -> Result<Bytes> {
        let mut reader = self.access.open_read_stream(path).await?;
        let mut out = BytesMut::new();
        let mut chunk = vec![0u8; chunk_size];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out.freeze())
    }

    /// Replace a file's contents, returning the number of bytes written.
    #[instrument(skip(self, data), fields(encoding = %encoding))]
    pub async fn write_file(&self, path: &str, data: Payload, encoding: Encoding) -> Result<u64> {
        let target = self.resolve(path);
        match encoding {
            Encoding::Uri => {
                let source = self.uri_source(&data)?;
                Ok(self.access.copy(&source, &target).await?)
            }
            _ => {
                let bytes = decode(&data, encoding)?;
                let written = bytes.len() as u64;
                self.access.write_file(&target, Bytes::from(bytes)).await?;
                Ok(written)
            }
        }
    }

    /// Append to a file, returning the number of bytes appended.
    #[instrument(skip(self, data), fields(encoding = %encoding))]
    pub async fn append_file(&self, path: &str, data: Payload, encoding: Encoding) -> Result<u64> {
        let target = self.resolve(path);
        match encoding {
            Encoding::Uri => {
                let source = self.uri_source(&data)?;
                let mut reader = self.access.open_read_stream(&source).await?;
                let mut writer = self.access.open_write_stream(&target, true).await?;
                let copied = tokio::io::copy(&mut reader, &mut writer).await?;
                writer.shutdown().await?;
                Ok(copied)
            }
            _ => {
                let bytes = decode(&data, encoding)?;
                let written = bytes.len() as u64;
                self.access.append_file(&target, Bytes::from(bytes)).await?;
                Ok(written)
            }
        }
    }

    fn uri_source(&self, data: &Payload) -> Result<PathBuf> {
        match data {
            Payload::Text(source) => Ok(self.resolve(source)),
            Payload::Bytes(_) => Err(BlobError::InvalidArgument(
                "The uri encoding expects a source path".to_string(),
            )),
        }
    }

    /// Open a read stream; the file must exist. Call `open()` to start it.
    pub async fn read_stream(
        &self,
        path: &str,
        encoding: Encoding,
        buffer_size: Option<usize>,
        tick: Option<Duration>,
    ) -> Result<ReadStream> {
        let target = self.resolve(path);
        let meta = self.access.metadata(&target).await?;
        if meta.is_directory() {
            return Err(BlobError::InvalidArgument(format!(
                "{} is a directory",
                target.display()
            )));
        }

        ReadStream::new(
            self.access.clone(),
            target,
            encoding,
            Some(buffer_size.unwrap_or(self.defaults.buffer_size)),
            Some(tick.unwrap_or(self.defaults.tick)),
        )
    }

    pub async fn write_stream(&self, path: &str, encoding: Encoding, append: bool) -> Result<WriteStream> {
        WriteStream::open(self.access.as_ref(), self.resolve(path), encoding, append).await
    }

    /// Create a directory and its parents; fails if it already exists.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        if self.access.exists(&target).await? {
            return Err(BridgeError::AlreadyExists(target).into());
        }
        self.access.create_dir_all(&target).await?;
        Ok(())
    }

    /// Shared container for an app group.
    pub fn path_for_app_group(&self, group: &str) -> Result<PathBuf> {
        self.app_groups.get(group).cloned().ok_or_else(|| {
            BridgeError::NotAvailable(format!("No container configured for app group '{}'", group))
                .into()
        })
    }

    pub async fn stat(&self, path: &str) -> Result<BlobFile> {
        let meta = self.access.metadata(&self.resolve(path)).await?;
        Ok(meta.into())
    }

    /// Stat every direct child of a directory, or the file itself.
    pub async fn lstat(&self, path: &str) -> Result<Vec<BlobFile>> {
        let target = self.resolve(path);
        let meta = self.access.metadata(&target).await?;
        if !meta.is_directory() {
            return Ok(vec![meta.into()]);
        }

        let mut files = Vec::new();
        for child in self.access.list_directory(&target).await? {
            files.push(self.access.metadata(&child).await?.into());
        }
        Ok(files)
    }

    /// Register files with the platform media library.
    pub async fn scan_file(&self, entries: Vec<ScanEntry>) -> Result<()> {
        let scanner = self.media_scanner.as_ref().ok_or_else(|| {
            BlobError::Unsupported("No media scanner is available on this platform".to_string())
        })?;
        let entries = entries
            .into_iter()
            .map(|entry| ScanEntry {
                path: self.resolve(&entry.path.to_string_lossy()),
                mime: entry.mime,
            })
            .collect();
        scanner.scan(entries).await?;
        Ok(())
    }

    pub async fn cp(&self, src: &str, dest: &str) -> Result<bool> {
        self.access.copy(&self.resolve(src), &self.resolve(dest)).await?;
        Ok(true)
    }

    pub async fn mv(&self, src: &str, dest: &str) -> Result<bool> {
        self.access.rename(&self.resolve(src), &self.resolve(dest)).await?;
        Ok(true)
    }

    /// Names of the entries in a directory.
    pub async fn ls(&self, path: &str) -> Result<Vec<String>> {
        let entries = self.access.list_directory(&self.resolve(path)).await?;
        Ok(entries
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    /// Delete a file or a directory tree. Missing paths are not an error.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let meta = match self.access.metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => {
                debug!(path = ?target, "Nothing to unlink");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if meta.is_directory() {
            self.access.delete_dir_all(&target).await?;
        } else {
            self.access.delete_file(&target).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.access.exists(&self.resolve(path)).await?)
    }

    /// Existence of each path, in order.
    pub async fn exists_all<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<bool>> {
        let mut found = Vec::with_capacity(paths.len());
        for path in paths {
            found.push(self.exists(path.as_ref()).await?);
        }
        Ok(found)
    }

    /// True when `path` is an existing directory.
    pub async fn is_dir(&self, path: &str) -> Result<bool> {
        match self.access.metadata(&self.resolve(path)).await {
            Ok(meta) => Ok(meta.is_directory()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Free and total space of the volume holding the cache directory.
    pub async fn df(&self) -> Result<DiskSpace> {
        Ok(self.access.disk_space(&self.dirs.cache).await?)
    }

    /// Copy bytes `[start, end)` of `src` into `dest`, returning `dest`.
    ///
    /// `end` is clamped to the file size; `start` past `end` is an error.
    pub async fn slice(&self, src: &str, dest: &str, start: u64, end: u64) -> Result<String> {
        if start > end {
            return Err(BlobError::InvalidArgument(format!(
                "Slice start {} is greater than end {}",
                start, end
            )));
        }
        self.access
            .slice(&self.resolve(src), &self.resolve(dest), start, end)
            .await?;
        Ok(dest.to_string())
    }
}

impl std::fmt::Debug for Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fs")
            .field("dirs", &self.dirs)
            .field("asset_dir", &self.asset_dir)
            .field("app_groups", &self.app_groups)
            .field("sessions", &self.sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::{LoggingMediaScanner, TokioFileSystem};

    fn facade(root: &Path) -> Fs {
        let config = BlobConfig::builder()
            .file_system(Arc::new(TokioFileSystem::new()))
            .http_client(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
            .media_scanner(Arc::new(LoggingMediaScanner))
            .directories(PlatformDirectories::rooted_at(root))
            .asset_dir(root.join("assets"))
            .app_group("group.shared", root.join("group"))
            .build()
            .unwrap();
        Fs::new(&config, EventBus::default()).with_sessions(SessionRegistry::new())
    }

    fn p(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_create_file_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let file = p(&dir.path().join("a.txt"));

        fs.create_file(&file, "aGk=".into(), Encoding::Base64).await.unwrap();
        assert_eq!(
            fs.read_file(&file, Encoding::Utf8, None).await.unwrap(),
            Payload::Text("hi".into())
        );

        let err = fs.create_file(&file, "x".into(), Encoding::Utf8).await.unwrap_err();
        assert!(matches!(err, BlobError::Bridge(BridgeError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_write_and_append_report_byte_counts() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let file = p(&dir.path().join("out.txt"));

        assert_eq!(fs.write_file(&file, "héllo".into(), Encoding::Utf8).await.unwrap(), 6);
        assert_eq!(
            fs.append_file(&file, Payload::Bytes(vec![33, 33]), Encoding::Ascii)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            fs.read_file(&file, Encoding::Utf8, Some(3)).await.unwrap(),
            Payload::Text("héllo!!".into())
        );
    }

    #[tokio::test]
    async fn test_uri_encoding_copies_source() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let src = p(&dir.path().join("src.txt"));
        let dest = p(&dir.path().join("dest.txt"));
        fs.write_file(&src, "abc".into(), Encoding::Utf8).await.unwrap();

        let wrapped = wrap::wrap(&src);
        assert_eq!(fs.write_file(&dest, wrapped.as_str().into(), Encoding::Uri).await.unwrap(), 3);
        assert_eq!(fs.append_file(&dest, src.as_str().into(), Encoding::Uri).await.unwrap(), 3);
        assert_eq!(
            fs.read_file(&dest, Encoding::Ascii, None).await.unwrap(),
            Payload::Bytes(b"abcabc".to_vec())
        );
    }

    #[tokio::test]
    async fn test_directory_operations() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let sub = p(&dir.path().join("sub"));

        fs.mkdir(&sub).await.unwrap();
        assert!(fs.mkdir(&sub).await.is_err());
        assert!(fs.is_dir(&sub).await.unwrap());
        assert!(!fs.is_dir(&p(&dir.path().join("none"))).await.unwrap());

        fs.write_file(&format!("{}/b.txt", sub), "b".into(), Encoding::Utf8).await.unwrap();
        fs.write_file(&format!("{}/a.txt", sub), "aa".into(), Encoding::Utf8).await.unwrap();
        assert_eq!(fs.ls(&sub).await.unwrap(), vec!["a.txt", "b.txt"]);

        let listing = fs.lstat(&sub).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].filename, "a.txt");
        assert_eq!(listing[0].size, 2);
        assert_eq!(listing[0].kind, FileKind::File);

        let stat = fs.stat(&sub).await.unwrap();
        assert_eq!(stat.kind, FileKind::Directory);

        fs.unlink(&sub).await.unwrap();
        assert!(!fs.exists(&sub).await.unwrap());
        fs.unlink(&sub).await.unwrap();
    }

    #[tokio::test]
    async fn test_cp_mv_and_exists_all() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let a = p(&dir.path().join("a"));
        let b = p(&dir.path().join("b"));
        let c = p(&dir.path().join("c"));
        fs.write_file(&a, "1".into(), Encoding::Utf8).await.unwrap();

        assert!(fs.cp(&a, &b).await.unwrap());
        assert!(fs.mv(&b, &c).await.unwrap());
        assert_eq!(fs.exists_all(&[&a, &b, &c]).await.unwrap(), vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_slice_returns_dest_and_validates_range() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let src = p(&dir.path().join("src"));
        let dest = p(&dir.path().join("dest"));
        fs.write_file(&src, "0123456789".into(), Encoding::Utf8).await.unwrap();

        assert_eq!(fs.slice(&src, &dest, 2, 5).await.unwrap(), dest);
        assert_eq!(
            fs.read_file(&dest, Encoding::Utf8, None).await.unwrap(),
            Payload::Text("234".into())
        );

        fs.slice(&src, &dest, 8, 1000).await.unwrap();
        assert_eq!(
            fs.read_file(&dest, Encoding::Utf8, None).await.unwrap(),
            Payload::Text("89".into())
        );

        assert!(matches!(
            fs.slice(&src, &dest, 5, 2).await,
            Err(BlobError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_assets_and_wrapped_paths() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());

        assert_eq!(
            fs.resolve(&fs.asset("img/logo.png")),
            dir.path().join("assets").join("img/logo.png")
        );
        assert_eq!(fs.resolve(&wrap::wrap("/tmp/x")), PathBuf::from("/tmp/x"));
        assert_eq!(fs.resolve("file:///tmp/y"), PathBuf::from("/tmp/y"));
        assert_eq!(fs.resolve("/tmp/z"), PathBuf::from("/tmp/z"));
    }

    #[tokio::test]
    async fn test_app_groups_and_scanner() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());

        assert_eq!(
            fs.path_for_app_group("group.shared").unwrap(),
            dir.path().join("group")
        );
        assert!(matches!(
            fs.path_for_app_group("group.other"),
            Err(BlobError::Bridge(BridgeError::NotAvailable(_)))
        ));

        fs.scan_file(vec![ScanEntry {
            path: dir.path().join("a.mp3"),
            mime: Some("audio/mpeg".to_string()),
        }])
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_session_from_facade_shares_registry() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        fs.session("cache").add("/one");
        assert_eq!(fs.sessions().get_session("cache"), Some(vec![PathBuf::from("/one")]));
        assert_eq!(fs.session("cache").list(), vec![PathBuf::from("/one")]);
    }

    #[tokio::test]
    async fn test_read_stream_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = facade(dir.path());
        let err = fs
            .read_stream(&p(&dir.path().join("missing")), Encoding::Utf8, None, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
