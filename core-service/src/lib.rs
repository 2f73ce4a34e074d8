//! Top-level `FetchBlob` facade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! media scanning, directories) into the blob core. Desktop apps typically
//! enable the `desktop-shims` feature (which depends on `bridge-desktop`)
//! and call [`bootstrap_desktop`]; other hosts inject their own bridges via
//! [`CoreDependencies`].
//!
//! ```ignore
//! let blob = core_service::bootstrap_desktop("photo-sync")?;
//!
//! let res = blob
//!     .config(RequestConfig::default().file_cache(true).append_ext("jpg"))
//!     .fetch(HttpMethod::Get, "https://example.com/cat.jpg", Headers::new(), RequestBody::Empty)
//!     .progress(|received, total| println!("{received} / {total:?}"))
//!     .await?;
//! println!("saved to {:?}", res.path());
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use bridge_traits::HttpMethod;
pub use core_blob::{
    wrap, BlobError, BlobFile, Encoding, FetchBlobResponse, FetchTask, FormField, Fs, Headers,
    Payload, ProgressOptions, ReadStream, RequestBody, RequestConfig, Session, WriteStream,
};
pub use core_runtime::config::{BlobConfig, BlobConfigBuilder};
pub use core_runtime::events::{CoreEvent, EventBus};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    storage::{FileSystemAccess, MediaScanner, PlatformDirectories},
};
use core_blob::BlobFetcher;
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub media_scanner: Option<Arc<dyn MediaScanner>>,
    pub directories: Option<PlatformDirectories>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(http_client: Arc<dyn HttpClient>, filesystem: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            http_client,
            filesystem,
            media_scanner: None,
            directories: None,
        }
    }

    pub fn with_media_scanner(mut self, scanner: Arc<dyn MediaScanner>) -> Self {
        self.media_scanner = Some(scanner);
        self
    }

    pub fn with_directories(mut self, directories: PlatformDirectories) -> Self {
        self.directories = Some(directories);
        self
    }

    /// Apply the bridges to a configuration builder.
    pub fn apply(self, builder: BlobConfigBuilder) -> BlobConfigBuilder {
        let mut builder = builder
            .http_client(self.http_client)
            .file_system(self.filesystem);
        if let Some(scanner) = self.media_scanner {
            builder = builder.media_scanner(scanner);
        }
        if let Some(directories) = self.directories {
            builder = builder.directories(directories);
        }
        builder
    }
}

/// Primary facade exposed to host applications.
#[derive(Clone)]
pub struct FetchBlob {
    config: Arc<BlobConfig>,
    fetcher: BlobFetcher,
}

impl FetchBlob {
    /// Create the facade from a built configuration.
    pub fn new(config: BlobConfig) -> Self {
        let events = EventBus::new(config.event_buffer_size);
        let fs = Fs::new(&config, events);
        let fetcher = BlobFetcher::new(&config, fs);
        info!(app = %config.app_name, "FetchBlob initialized");
        Self {
            config: Arc::new(config),
            fetcher,
        }
    }

    /// Create the facade from explicit bridges with default settings.
    pub fn from_dependencies(deps: CoreDependencies) -> Result<Self> {
        let config = deps.apply(BlobConfig::builder()).build()?;
        Ok(Self::new(config))
    }

    pub fn configuration(&self) -> &BlobConfig {
        &self.config
    }

    /// Bind request options for the calls that follow.
    pub fn config(&self, options: RequestConfig) -> ConfiguredFetch {
        ConfiguredFetch {
            fetcher: self.fetcher.clone(),
            options,
        }
    }

    /// HTTP transfer with default options.
    pub fn fetch(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        headers: Headers,
        body: impl Into<RequestBody>,
    ) -> FetchTask {
        self.fetcher
            .fetch(RequestConfig::default(), method, url, headers, body.into())
    }

    /// Local-file transfer with default options.
    pub fn fetch_file(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        headers: Headers,
        body: impl Into<RequestBody>,
    ) -> FetchTask {
        self.fetcher
            .fetch_file(RequestConfig::default(), method, url, headers, body.into())
    }

    /// Mark a path as a file reference for request bodies and form fields.
    pub fn wrap(path: impl AsRef<str>) -> String {
        wrap::wrap(path)
    }

    pub fn fs(&self) -> &Fs {
        self.fetcher.fs()
    }

    pub fn session(&self, name: &str) -> Session {
        self.fetcher.fs().session(name)
    }

    /// Transfer and session events.
    pub fn events(&self) -> &EventBus {
        self.fetcher.events()
    }
}

impl std::fmt::Debug for FetchBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchBlob")
            .field("app_name", &self.config.app_name)
            .field("fetcher", &self.fetcher)
            .finish()
    }
}

/// Request options bound to the facade, from [`FetchBlob::config`].
#[derive(Clone, Debug)]
pub struct ConfiguredFetch {
    fetcher: BlobFetcher,
    options: RequestConfig,
}

impl ConfiguredFetch {
    pub fn options(&self) -> &RequestConfig {
        &self.options
    }

    pub fn fetch(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        headers: Headers,
        body: impl Into<RequestBody>,
    ) -> FetchTask {
        self.fetcher
            .fetch(self.options.clone(), method, url, headers, body.into())
    }

    pub fn fetch_file(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        headers: Headers,
        body: impl Into<RequestBody>,
    ) -> FetchTask {
        self.fetcher
            .fetch_file(self.options.clone(), method, url, headers, body.into())
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Bridges come from `bridge-desktop`; directories are namespaced by
/// `app_name`.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(app_name: &str) -> Result<FetchBlob> {
    let config = BlobConfig::builder().app_name(app_name).build()?;
    Ok(FetchBlob::new(config))
}
