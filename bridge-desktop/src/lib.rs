//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `FileSystemAccess` using `tokio::fs`, with `sysinfo` for volume capacity
//! - `PlatformDirectories` resolved with the `dirs` crate
//! - `MediaScanner` as a logging no-op (desktop has no media index)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopDirectories, ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let fs = TokioFileSystem::new();
//!     let dirs = DesktopDirectories::discover("my-app");
//!
//!     // Use in core configuration
//! }
//! ```

mod directories;
mod filesystem;
mod http;
mod media;

pub use directories::DesktopDirectories;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use media::LoggingMediaScanner;
