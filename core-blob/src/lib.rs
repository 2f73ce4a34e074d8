//! # Blob Core
//!
//! Transfer and file primitives behind the `fetch-blob` facade.
//!
//! - [`fetch`]: HTTP and local-file transfers with progress and cancellation
//! - [`fs`]: path-string filesystem operations with payload encodings
//! - [`stream`]: chunked read and write streams with listener callbacks
//! - [`session`]: named groups of files disposed together
//! - [`wrap`]: helpers for wrapped file references

pub mod encoding;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod multipart;
pub mod progress;
pub mod response;
pub mod session;
pub mod stream;
pub mod wrap;

pub use encoding::{Encoding, Payload};
pub use error::{BlobError, Result};
pub use fetch::{cache_key, BlobFetcher, FetchTask, RequestBody, RequestConfig};
pub use fs::{BlobFile, Fs};
pub use multipart::FormField;
pub use progress::{ProgressCallback, ProgressOptions};
pub use response::{
    DataKind, FetchBlobResponse, Headers, ResponseBody, ResponseInfo, ResponseType, RnfbEncode,
    TaskState,
};
pub use session::{Session, SessionRegistry};
pub use stream::{ReadStream, WriteStream};
