//! # Multipart Form Bodies
//!
//! Builds `multipart/form-data` bodies where each field is either plain text,
//! base64-encoded binary, or a file streamed from disk:
//!
//! ```text
//! --RNFetchBlob-<task id>\r\n
//! Content-Disposition: form-data; name="avatar"; filename="me.png"\r\n
//! Content-Type: image/png\r\n
//! \r\n
//! <file bytes>\r\n
//! --RNFetchBlob-<task id>--\r\n
//! ```
//!
//! File parts are never loaded into memory; their size is taken from file
//! metadata so the total length is known before the upload starts.

use crate::error::{BlobError, Result};
use crate::fs::Fs;
use crate::wrap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::ByteStream;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use tracing::debug;

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";
const DEFAULT_TEXT_TYPE: &str = "text/plain";

/// One form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Wrapped file path, base64 (when `filename` is set) or plain text
    pub data: String,
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into(),
        }
    }

    /// A file part whose data is a wrapped path or base64 text.
    pub fn file(name: impl Into<String>, filename: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

enum Segment {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Segment::Bytes(bytes) => bytes.len() as u64,
            Segment::File { len, .. } => *len,
        }
    }
}

/// A resolved multipart body ready to be streamed.
pub struct MultipartBody {
    boundary: String,
    segments: Vec<Segment>,
}

impl MultipartBody {
    /// Boundary used for a task's form body.
    pub fn boundary_for(task_id: &str) -> String {
        format!("RNFetchBlob-{}", task_id)
    }

    /// Resolve fields into body segments.
    ///
    /// Wrapped paths must point at existing files.
    pub async fn build(fields: &[FormField], boundary: impl Into<String>, fs: &Fs) -> Result<Self> {
        let boundary = boundary.into();
        let mut segments = Vec::with_capacity(fields.len() * 3 + 1);

        for field in fields {
            let mut header = format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
                boundary,
                escape_quotes(&field.name)
            );

            match (&field.filename, wrap::is_wrapped(&field.data) || wrap::is_asset(&field.data)) {
                (filename, true) => {
                    let path = fs.resolve(&field.data);
                    let meta = fs.access().metadata(&path).await?;
                    if meta.is_directory() {
                        return Err(BlobError::InvalidArgument(format!(
                            "Form field '{}' points at a directory",
                            field.name
                        )));
                    }
                    let filename = filename.clone().unwrap_or_else(|| meta.name.clone());
                    push_file_header(&mut header, &filename, field.content_type.as_deref());
                    segments.push(Segment::Bytes(Bytes::from(header)));
                    segments.push(Segment::File {
                        path,
                        len: meta.size,
                    });
                }
                (Some(filename), false) => {
                    let bytes = STANDARD.decode(field.data.trim())?;
                    push_file_header(&mut header, filename, field.content_type.as_deref());
                    segments.push(Segment::Bytes(Bytes::from(header)));
                    segments.push(Segment::Bytes(Bytes::from(bytes)));
                }
                (None, false) => {
                    header.push_str(&format!(
                        "\r\nContent-Type: {}\r\n\r\n",
                        field.content_type.as_deref().unwrap_or(DEFAULT_TEXT_TYPE)
                    ));
                    segments.push(Segment::Bytes(Bytes::from(header)));
                    segments.push(Segment::Bytes(Bytes::from(field.data.clone())));
                }
            }
            segments.push(Segment::Bytes(Bytes::from_static(b"\r\n")));
        }

        segments.push(Segment::Bytes(Bytes::from(format!("--{}--\r\n", boundary))));

        let body = Self { boundary, segments };
        debug!(fields = fields.len(), length = body.len(), "Built multipart body");
        Ok(body)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Total body length in bytes.
    pub fn len(&self) -> u64 {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stream the body, opening file parts lazily.
    pub fn into_stream(self, fs: &Fs) -> ByteStream {
        let access = fs.access().clone();
        let parts: Vec<ByteStream> = self
            .segments
            .into_iter()
            .map(|segment| match segment {
                Segment::Bytes(bytes) => {
                    stream::once(async move { Ok::<_, std::io::Error>(bytes) }).boxed()
                }
                Segment::File { path, .. } => {
                    let access = access.clone();
                    stream::once(async move {
                        access
                            .open_read_stream(&path)
                            .await
                            .map_err(std::io::Error::other)
                    })
                    .map_ok(ReaderStream::new)
                    .try_flatten()
                    .boxed()
                }
            })
            .collect();

        stream::iter(parts).flatten().boxed()
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary)
            .field("segments", &self.segments.len())
            .field("len", &self.len())
            .finish()
    }
}

fn push_file_header(header: &mut String, filename: &str, content_type: Option<&str>) {
    header.push_str(&format!(
        "; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        escape_quotes(filename),
        content_type.unwrap_or(DEFAULT_FILE_TYPE)
    ));
}

fn escape_quotes(value: &str) -> String {
    value.replace('"', "%22")
}
