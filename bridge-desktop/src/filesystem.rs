//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{DiskSpace, FileKind, FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using:
/// - `tokio::fs` for async operations
/// - `sysinfo` for volume capacity
#[derive(Debug, Default, Clone)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

fn to_metadata(path: &Path, metadata: &std::fs::Metadata) -> FileMetadata {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    FileMetadata {
        path: path.to_path_buf(),
        name,
        size: metadata.len(),
        modified_at_ms: metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64),
        kind: if metadata.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        },
    }
}

/// Pick the disk whose mount point is the longest prefix of `path`
fn disk_space_for(path: &Path) -> Result<DiskSpace> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| DiskSpace {
            free: disk.available_space(),
            total: disk.total_space(),
        })
        .ok_or_else(|| {
            BridgeError::NotAvailable(format!("No mounted volume holds {}", path.display()))
        })
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        Ok(to_metadata(path, &metadata))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        fs::write(path, data.as_ref())
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn append_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;

        file.write_all(data.as_ref()).await?;
        file.flush().await?;

        debug!(path = ?path, size = data.len(), "Appended to file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, "Deleted directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;

        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        self.ensure_parent(to).await?;
        let copied = fs::copy(from, to)
            .await
            .map_err(|e| BridgeError::from_io(e, from))?;
        debug!(from = ?from, to = ?to, size = copied, "Copied file");
        Ok(copied)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.ensure_parent(to).await?;
        fs::rename(from, to)
            .await
            .map_err(|e| BridgeError::from_io(e, from))?;
        debug!(from = ?from, to = ?to, "Moved file");
        Ok(())
    }

    async fn slice(&self, src: &Path, dest: &Path, start: u64, end: u64) -> Result<u64> {
        let mut source = fs::File::open(src)
            .await
            .map_err(|e| BridgeError::from_io(e, src))?;
        let size = source.metadata().await?.len();
        let end = end.min(size);
        if start > end {
            return Err(BridgeError::InvalidInput(format!(
                "Slice start {} is beyond end {}",
                start, end
            )));
        }

        self.ensure_parent(dest).await?;
        let mut target = fs::File::create(dest)
            .await
            .map_err(|e| BridgeError::from_io(e, dest))?;

        source.seek(std::io::SeekFrom::Start(start)).await?;
        let mut limited = source.take(end - start);
        let written = tokio::io::copy(&mut limited, &mut target).await?;
        target.flush().await?;

        debug!(src = ?src, dest = ?dest, start, end, written, "Sliced file");
        Ok(written)
    }

    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let file = fs::File::open(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn open_write_stream(
        &self,
        path: &Path,
        append: bool,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
        self.ensure_parent(path).await?;

        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await
            .map_err(|e| BridgeError::from_io(e, path))?;
        debug!(path = ?path, append, "Opened file for writing");
        Ok(Box::new(file))
    }

    async fn disk_space(&self, path: &Path) -> Result<DiskSpace> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let space = tokio::task::spawn_blocking(move || disk_space_for(&path))
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))??;
        debug!(free = space.free, total = space.total, "Queried disk space");
        Ok(space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let test_file = dir.path().join("nested").join("test-file.txt");

        let data = Bytes::from("Hello, World!");
        fs.write_file(&test_file, data.clone()).await.unwrap();

        let read_data = fs.read_file(&test_file).await.unwrap();
        assert_eq!(data, read_data);

        fs.delete_file(&test_file).await.unwrap();
        assert!(!fs.exists(&test_file).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();

        let err = fs.metadata(&dir.path().join("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_reports_kind_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let file = dir.path().join("a.bin");
        fs.write_file(&file, Bytes::from_static(b"12345")).await.unwrap();

        let meta = fs.metadata(&file).await.unwrap();
        assert_eq!(meta.name, "a.bin");
        assert_eq!(meta.size, 5);
        assert_eq!(meta.kind, FileKind::File);
        assert!(meta.modified_at_ms.is_some());

        let meta = fs.metadata(dir.path()).await.unwrap();
        assert!(meta.is_directory());
    }

    #[tokio::test]
    async fn test_slice_clamps_end() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        fs.write_file(&src, Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let written = fs.slice(&src, &dest, 4, 100).await.unwrap();
        assert_eq!(written, 6);
        assert_eq!(fs.read_file(&dest).await.unwrap(), Bytes::from("456789"));

        let err = fs.slice(&src, &dest, 20, 30).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_write_stream_append_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let file = dir.path().join("log.txt");

        let mut writer = fs.open_write_stream(&file, false).await.unwrap();
        writer.write_all(b"one").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut writer = fs.open_write_stream(&file, true).await.unwrap();
        writer.write_all(b"two").await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(fs.read_file(&file).await.unwrap(), Bytes::from("onetwo"));

        let mut writer = fs.open_write_stream(&file, false).await.unwrap();
        writer.write_all(b"3").await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(fs.read_file(&file).await.unwrap(), Bytes::from("3"));
    }

    #[tokio::test]
    async fn test_copy_rename_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let a = dir.path().join("a.txt");
        fs.write_file(&a, Bytes::from_static(b"data")).await.unwrap();

        let copied = fs.copy(&a, &dir.path().join("b.txt")).await.unwrap();
        assert_eq!(copied, 4);
        fs.rename(&a, &dir.path().join("sub").join("c.txt"))
            .await
            .unwrap();

        let entries = fs.list_directory(dir.path()).await.unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.txt", "sub"]);
        assert_eq!(fs.directory_size(dir.path()).await.unwrap(), 8);
    }
}
