//! # Core Configuration Module
//!
//! Provides configuration management for the blob core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `BlobConfig`
//! instance that holds all bridges and transfer defaults the core needs. It
//! enforces fail-fast validation so a missing capability is reported before
//! the first request is made.
//!
//! ## Required Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP transfers (desktop default: reqwest)
//! - `FileSystemAccess` - File I/O (desktop default: tokio fs)
//! - `PlatformDirectories` - Well-known directories (desktop default: `dirs`)
//!
//! ## Optional Dependencies
//!
//! - `MediaScanner` - Media library registration (desktop default: logging no-op)
//! - `Clock` - Time source for progress throttling (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically for anything not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::BlobConfig;
//! use std::time::Duration;
//!
//! let config = BlobConfig::builder()
//!     .app_name("photo-sync")
//!     .default_timeout(Duration::from_secs(60))
//!     .app_group("group.com.example.shared", "/srv/shared")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Without `desktop-shims`, building a config without bridges fails with
//! [`Error::CapabilityMissing`] and a message describing what to inject.

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, FileSystemAccess, HttpClient, MediaScanner, PlatformDirectories, SystemClock,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application name used to namespace cache directories when none is set.
pub const DEFAULT_APP_NAME: &str = "fetch-blob";

/// Defaults applied to transfers and streams when a call does not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDefaults {
    /// Request timeout (default 30 s)
    pub timeout: Duration,
    /// Chunk size for file read streams (default 4096 bytes)
    pub buffer_size: usize,
    /// Pause between stream chunks (default 10 ms)
    pub tick: Duration,
    /// Chunk size used when fetching from the local filesystem (default 400 KiB)
    pub file_fetch_buffer_size: usize,
    /// Pause between chunks when fetching from the local filesystem (default 100 ms)
    pub file_fetch_tick: Duration,
}

impl Default for TransferDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            buffer_size: 4096,
            tick: Duration::from_millis(10),
            file_fetch_buffer_size: 409_600,
            file_fetch_tick: Duration::from_millis(100),
        }
    }
}

/// Blob core configuration.
///
/// Use [`BlobConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BlobConfig {
    /// Application name, used to namespace default directories
    pub app_name: String,

    /// HTTP client for transfers
    pub http_client: Arc<dyn HttpClient>,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Media library registration (optional)
    pub media_scanner: Option<Arc<dyn MediaScanner>>,

    /// Well-known platform directories
    pub directories: PlatformDirectories,

    /// Directory that `bundle-assets://` paths resolve into
    pub asset_dir: PathBuf,

    /// Shared containers addressable by app-group identifier
    pub app_groups: HashMap<String, PathBuf>,

    /// Transfer and stream defaults
    pub transfer: TransferDefaults,

    /// Capacity of the transfer event channel
    pub event_buffer_size: usize,

    /// Time source for progress throttling
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobConfig")
            .field("app_name", &self.app_name)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field(
                "media_scanner",
                &self.media_scanner.as_ref().map(|_| "MediaScanner { ... }"),
            )
            .field("directories", &self.directories)
            .field("asset_dir", &self.asset_dir)
            .field("app_groups", &self.app_groups)
            .field("transfer", &self.transfer)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl BlobConfig {
    /// Creates a new builder for constructing a `BlobConfig`.
    pub fn builder() -> BlobConfigBuilder {
        BlobConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Application name is not empty
    /// - Cache directory is set
    /// - Buffer sizes, timeout and event capacity are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("Application name cannot be empty".to_string()));
        }

        if self.directories.cache.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.transfer.timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.transfer.buffer_size == 0 || self.transfer.file_fetch_buffer_size == 0 {
            return Err(Error::Config(
                "Stream buffer sizes must be greater than 0 bytes".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        for (group, path) in &self.app_groups {
            if group.is_empty() || path.as_os_str().is_empty() {
                return Err(Error::Config(format!(
                    "App group '{}' must have a non-empty identifier and path",
                    group
                )));
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled. \
             Mobile: inject the platform-native adapter.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::with_timeout(
        timeout,
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "network transfers"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "file I/O"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_directories(app_name: &str) -> Result<PlatformDirectories> {
    Ok(bridge_desktop::DesktopDirectories::discover(app_name))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_directories(_app_name: &str) -> Result<PlatformDirectories> {
    Err(capability_missing(
        "PlatformDirectories",
        "resolving well-known directories",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_media_scanner() -> Option<Arc<dyn MediaScanner>> {
    Some(Arc::new(bridge_desktop::LoggingMediaScanner))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_media_scanner() -> Option<Arc<dyn MediaScanner>> {
    None
}

/// Builder for constructing [`BlobConfig`] instances.
#[derive(Default)]
pub struct BlobConfigBuilder {
    app_name: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    media_scanner: Option<Arc<dyn MediaScanner>>,
    directories: Option<PlatformDirectories>,
    asset_dir: Option<PathBuf>,
    app_groups: HashMap<String, PathBuf>,
    transfer: TransferDefaults,
    event_buffer_size: Option<usize>,
    clock: Option<Arc<dyn Clock>>,
}

impl BlobConfigBuilder {
    /// Sets the application name used to namespace default directories.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the media scanner implementation.
    pub fn media_scanner(mut self, scanner: Arc<dyn MediaScanner>) -> Self {
        self.media_scanner = Some(scanner);
        self
    }

    /// Overrides the well-known directories.
    pub fn directories(mut self, directories: PlatformDirectories) -> Self {
        self.directories = Some(directories);
        self
    }

    /// Sets the directory bundled assets resolve into.
    ///
    /// Defaults to `assets/` below the main bundle directory.
    pub fn asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = Some(dir.into());
        self
    }

    /// Registers a shared container for an app-group identifier.
    pub fn app_group(mut self, group: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.app_groups.insert(group.into(), path.into());
        self
    }

    /// Sets the default request timeout.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.transfer.timeout = timeout;
        self
    }

    /// Sets the default read-stream chunk size.
    pub fn default_buffer_size(mut self, size: usize) -> Self {
        self.transfer.buffer_size = size;
        self
    }

    /// Sets the default pause between read-stream chunks.
    pub fn default_tick(mut self, tick: Duration) -> Self {
        self.transfer.tick = tick;
        self
    }

    /// Sets all transfer defaults at once.
    pub fn transfer_defaults(mut self, transfer: TransferDefaults) -> Self {
        self.transfer = transfer;
        self
    }

    /// Sets the capacity of the transfer event channel.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `BlobConfig` instance.
    ///
    /// Missing bridges are filled with desktop defaults when the
    /// `desktop-shims` feature is enabled; otherwise an actionable
    /// `CapabilityMissing` error is returned.
    pub fn build(self) -> Result<BlobConfig> {
        let app_name = self
            .app_name
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string());

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(self.transfer.timeout)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let directories = match self.directories {
            Some(directories) => directories,
            None => provide_default_directories(&app_name)?,
        };

        let asset_dir = self
            .asset_dir
            .unwrap_or_else(|| directories.main_bundle.join("assets"));

        let config = BlobConfig {
            app_name,
            http_client,
            file_system,
            media_scanner: self.media_scanner.or_else(provide_default_media_scanner),
            directories,
            asset_dir,
            app_groups: self.app_groups,
            transfer: self.transfer,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
