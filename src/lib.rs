//! Workspace entry crate.
//!
//! Re-exports the [`FetchBlob`] facade and the types host code touches most
//! often, so applications can depend on `fetch-blob` alone and pick the
//! platform bridges through feature flags (`desktop-shims` by default).

pub use core_service::{
    wrap, BlobConfig, BlobError, BlobFile, ConfiguredFetch, CoreDependencies, CoreError,
    CoreEvent, Encoding, EventBus, FetchBlob, FetchBlobResponse, FetchTask, FormField, Fs,
    Headers, HttpMethod, Payload, ProgressOptions, ReadStream, RequestBody, RequestConfig,
    Result, Session, WriteStream,
};

#[cfg(feature = "desktop-shims")]
pub use core_service::bootstrap_desktop;
