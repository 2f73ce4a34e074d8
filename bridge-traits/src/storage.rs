//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for file I/O, the well-known directory
//! layout of the host platform, and media-library registration.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// File metadata information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: PathBuf,
    /// Final path component
    pub name: String,
    pub size: u64,
    /// Last modification time in milliseconds since the Unix epoch
    pub modified_at_ms: Option<i64>,
    pub kind: FileKind,
}

impl FileMetadata {
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Free and total bytes of the volume backing a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpace {
    pub free: u64,
    pub total: u64,
}

/// Well-known directories of the host platform.
///
/// Mobile hosts map these onto their sandbox containers; desktop hosts map
/// them onto the user's standard folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDirectories {
    #[serde(rename = "DocumentDir")]
    pub document: PathBuf,
    #[serde(rename = "CacheDir")]
    pub cache: PathBuf,
    #[serde(rename = "PictureDir")]
    pub picture: PathBuf,
    #[serde(rename = "MusicDir")]
    pub music: PathBuf,
    #[serde(rename = "MovieDir")]
    pub movie: PathBuf,
    #[serde(rename = "DownloadDir")]
    pub download: PathBuf,
    #[serde(rename = "DCIMDir")]
    pub dcim: PathBuf,
    #[serde(rename = "SDCardDir")]
    pub sd_card: PathBuf,
    #[serde(rename = "SDCardApplicationDir")]
    pub sd_card_application: PathBuf,
    #[serde(rename = "MainBundleDir")]
    pub main_bundle: PathBuf,
    #[serde(rename = "LibraryDir")]
    pub library: PathBuf,
}

impl PlatformDirectories {
    /// Lay every directory out below a single root. Useful for tests and
    /// sandboxed hosts.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            document: root.join("Documents"),
            cache: root.join("Caches"),
            picture: root.join("Pictures"),
            music: root.join("Music"),
            movie: root.join("Movies"),
            download: root.join("Downloads"),
            dcim: root.join("DCIM"),
            sd_card: root.join("SDCard"),
            sd_card_application: root.join("SDCard").join("Application"),
            main_bundle: root.join("Bundle"),
            library: root.join("Library"),
        }
    }
}

/// File system access trait
///
/// Abstracts file I/O operations to support different platforms:
/// - Desktop: Direct filesystem access
/// - iOS/Android: Sandboxed app directories
///
/// Errors for missing paths are reported as
/// [`BridgeError::NotFound`](crate::error::BridgeError::NotFound).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn cache_data(fs: &dyn FileSystemAccess, dir: &Path, data: &[u8]) -> Result<()> {
///     fs.write_file(&dir.join("data.bin"), data.to_vec().into()).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    ///
    /// For large files, consider using `open_read_stream` instead.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating or truncating it
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Append data to an existing file or create it
    async fn append_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Copy a file, returning the number of bytes copied
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Move or rename a file or directory
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Copy the byte range `[start, end)` of `src` into a new file at `dest`
    ///
    /// `end` is clamped to the size of `src`. Returns the number of bytes
    /// written.
    async fn slice(&self, src: &Path, dest: &Path, start: u64, end: u64) -> Result<u64>;

    /// Open a file for streaming reads
    ///
    /// This is more efficient than `read_file` for large files.
    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    /// Open a file for streaming writes, truncating unless `append` is set
    async fn open_write_stream(
        &self,
        path: &Path,
        append: bool,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;

    /// Free and total space of the volume holding `path`
    async fn disk_space(&self, path: &Path) -> Result<DiskSpace>;

    /// Calculate total size of a directory recursively
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let entries = self.list_directory(path).await?;

        for entry in entries {
            let metadata = self.metadata(&entry).await?;
            if metadata.is_directory() {
                total += self.directory_size(&entry).await?;
            } else {
                total += metadata.size;
            }
        }

        Ok(total)
    }
}

/// A file to register with the platform media library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub path: PathBuf,
    pub mime: Option<String>,
}

/// Media library registration
///
/// - Android: MediaScannerConnection
/// - Desktop: no media index, implementations may simply log
#[async_trait]
pub trait MediaScanner: Send + Sync {
    async fn scan(&self, entries: Vec<ScanEntry>) -> Result<()>;
}
