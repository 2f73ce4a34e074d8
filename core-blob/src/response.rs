//! # Fetch Responses
//!
//! A finished fetch either buffered its body in memory or stored it in a
//! file. [`FetchBlobResponse`] hides the difference: every accessor reads
//! the file on demand when the body lives on disk.
//!
//! ## Response metadata
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `resp_type` | `json`, `text`, `blob`, or empty when no `Content-Type` was sent |
//! | `rnfb_encode` | how `data()` is rendered: `path`, `base64`, `ascii` or `utf8` |
//! | `state` | numeric [`TaskState`] code |

use crate::encoding::{encode, Encoding, Payload};
use crate::error::{BlobError, Result};
use crate::fs::Fs;
use crate::session::Session;
use crate::stream::ReadStream;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Request or response headers.
pub type Headers = HashMap<String, String>;

/// Header a server can use to force how a buffered body is rendered.
pub const RESPONSE_ENCODING_HEADER: &str = "rnfb-response";

/// Lifecycle of a fetch task, exposed as a numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Completed = 2,
    Cancelled = 3,
    Failed = 4,
}

impl TaskState {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<TaskState> for u8 {
    fn from(state: TaskState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for TaskState {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(TaskState::Pending),
            1 => Ok(TaskState::Running),
            2 => Ok(TaskState::Completed),
            3 => Ok(TaskState::Cancelled),
            4 => Ok(TaskState::Failed),
            other => Err(format!("Unknown task state code {}", other)),
        }
    }
}

/// Coarse body classification derived from `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "blob")]
    Blob,
    #[serde(rename = "")]
    Empty,
    #[serde(rename = "json")]
    Json,
}

impl ResponseType {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(|c| c.trim().to_ascii_lowercase()) {
            None => ResponseType::Empty,
            Some(c) if c.is_empty() => ResponseType::Empty,
            Some(c) if c.contains("json") => ResponseType::Json,
            Some(c) if c.starts_with("text/") => ResponseType::Text,
            Some(_) => ResponseType::Blob,
        }
    }
}

/// How the response data is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RnfbEncode {
    Path,
    Base64,
    Ascii,
    Utf8,
}

impl RnfbEncode {
    /// Pick the rendering for a buffered body.
    ///
    /// An explicit `RNFB-Response` header wins, except that bytes which are
    /// not UTF-8 are never rendered as text. Otherwise text and JSON bodies
    /// that decode as UTF-8 are rendered as text, everything else as base64.
    pub fn for_buffered(headers: &Headers, resp_type: ResponseType, body: &[u8]) -> Self {
        let forced = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(RESPONSE_ENCODING_HEADER))
            .map(|(_, v)| v.trim().to_ascii_lowercase());

        let utf8 = std::str::from_utf8(body).is_ok();
        match forced.as_deref() {
            Some("utf8") if utf8 => return RnfbEncode::Utf8,
            Some("utf8") => return RnfbEncode::Base64,
            Some("base64") => return RnfbEncode::Base64,
            _ => {}
        }

        match resp_type {
            ResponseType::Json | ResponseType::Text if utf8 => RnfbEncode::Utf8,
            _ => RnfbEncode::Base64,
        }
    }
}

impl From<Encoding> for RnfbEncode {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Utf8 => RnfbEncode::Utf8,
            Encoding::Ascii => RnfbEncode::Ascii,
            Encoding::Base64 => RnfbEncode::Base64,
            Encoding::Uri => RnfbEncode::Path,
        }
    }
}

/// The `type` of a response's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Base64,
    Path,
    Utf8,
}

/// Metadata describing a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub task_id: String,
    pub state: TaskState,
    pub headers: Headers,
    pub status: u16,
    pub resp_type: ResponseType,
    pub rnfb_encode: RnfbEncode,
    /// Requested URL followed by the final URL when redirected
    #[serde(default)]
    pub redirects: Vec<String>,
}

impl ResponseInfo {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Where a response body ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Buffered(Bytes),
    Stored(PathBuf),
}

/// A finished fetch.
#[derive(Clone)]
pub struct FetchBlobResponse {
    info: ResponseInfo,
    body: ResponseBody,
    fs: Fs,
}

impl FetchBlobResponse {
    pub fn new(info: ResponseInfo, body: ResponseBody, fs: Fs) -> Self {
        Self { info, body, fs }
    }

    pub fn info(&self) -> &ResponseInfo {
        &self.info
    }

    pub fn task_id(&self) -> &str {
        &self.info.task_id
    }

    pub fn status(&self) -> u16 {
        self.info.status
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Kind of value returned by [`data`](Self::data).
    pub fn response_type(&self) -> DataKind {
        match (&self.body, self.info.rnfb_encode) {
            (ResponseBody::Stored(_), _) | (_, RnfbEncode::Path) => DataKind::Path,
            (ResponseBody::Buffered(bytes), RnfbEncode::Utf8) if std::str::from_utf8(bytes).is_ok() => {
                DataKind::Utf8
            }
            _ => DataKind::Base64,
        }
    }

    /// The body rendered per `rnfb_encode`, or the stored file path.
    pub fn data(&self) -> Payload {
        match &self.body {
            ResponseBody::Stored(path) => Payload::Text(path.to_string_lossy().into_owned()),
            ResponseBody::Buffered(bytes) => match self.info.rnfb_encode {
                RnfbEncode::Utf8 => match std::str::from_utf8(bytes) {
                    Ok(text) => Payload::Text(text.to_string()),
                    Err(_) => Payload::Text(STANDARD.encode(bytes)),
                },
                RnfbEncode::Ascii => Payload::Bytes(bytes.to_vec()),
                RnfbEncode::Base64 | RnfbEncode::Path => Payload::Text(STANDARD.encode(bytes)),
            },
        }
    }

    async fn bytes(&self) -> Result<Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes.clone()),
            ResponseBody::Stored(path) => Ok(self.fs.access().read_file(path).await?),
        }
    }

    pub async fn base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.bytes().await?))
    }

    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BlobError::Encoding(format!("Response body is not UTF-8: {}", e)))
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.bytes().await?)?)
    }

    /// Raw body bytes.
    pub async fn array(&self) -> Result<Vec<u8>> {
        Ok(self.bytes().await?.to_vec())
    }

    /// Path of the stored body, `None` when buffered.
    pub fn path(&self) -> Option<&Path> {
        match &self.body {
            ResponseBody::Stored(path) => Some(path),
            ResponseBody::Buffered(_) => None,
        }
    }

    /// Delete the stored body. Buffered responses have nothing to flush.
    pub async fn flush(&self) -> Result<()> {
        if let ResponseBody::Stored(path) = &self.body {
            match self.fs.access().delete_file(path).await {
                Ok(()) => debug!(task_id = %self.info.task_id, path = ?path, "Flushed response file"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Add the stored file to a session; `None` when buffered.
    pub fn session(&self, name: &str) -> Option<Session> {
        let path = self.path()?;
        let session = self.fs.session(name);
        session.add(path);
        Some(session)
    }

    /// Stream the stored body; `None` when buffered.
    pub async fn read_stream(&self, encoding: Encoding) -> Result<Option<ReadStream>> {
        match &self.body {
            ResponseBody::Stored(path) => Ok(Some(
                self.fs
                    .read_stream(&path.to_string_lossy(), encoding, None, None)
                    .await?,
            )),
            ResponseBody::Buffered(_) => Ok(None),
        }
    }

    /// Read the body with the given encoding.
    pub async fn read_file(&self, encoding: Encoding) -> Result<Payload> {
        encode(&self.bytes().await?, encoding)
    }
}

impl std::fmt::Debug for FetchBlobResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            ResponseBody::Buffered(bytes) => format!("Buffered({} bytes)", bytes.len()),
            ResponseBody::Stored(path) => format!("Stored({})", path.display()),
        };
        f.debug_struct("FetchBlobResponse")
            .field("info", &self.info)
            .field("body", &body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_type_from_content_type() {
        assert_eq!(
            ResponseType::from_content_type(Some("application/json; charset=utf-8")),
            ResponseType::Json
        );
        assert_eq!(ResponseType::from_content_type(Some("text/html")), ResponseType::Text);
        assert_eq!(ResponseType::from_content_type(Some("image/png")), ResponseType::Blob);
        assert_eq!(ResponseType::from_content_type(None), ResponseType::Empty);
    }

    #[test]
    fn test_rnfb_encode_detection() {
        let none = Headers::new();
        assert_eq!(
            RnfbEncode::for_buffered(&none, ResponseType::Json, b"{}"),
            RnfbEncode::Utf8
        );
        assert_eq!(
            RnfbEncode::for_buffered(&none, ResponseType::Text, &[0xff]),
            RnfbEncode::Base64
        );
        assert_eq!(
            RnfbEncode::for_buffered(&none, ResponseType::Blob, b"abc"),
            RnfbEncode::Base64
        );

        let forced: Headers = [("RNFB-Response".to_string(), "utf8".to_string())].into();
        assert_eq!(
            RnfbEncode::for_buffered(&forced, ResponseType::Blob, b"abc"),
            RnfbEncode::Utf8
        );
    }

    #[test]
    fn test_forced_utf8_falls_back_for_invalid_bytes() {
        let forced: Headers = [("rnfb-response".to_string(), "UTF8".to_string())].into();
        let encode = RnfbEncode::for_buffered(&forced, ResponseType::Text, &[0xff, 0xfe, b'A']);
        assert_eq!(encode, RnfbEncode::Base64);
    }

    #[test]
    fn test_task_state_codes_round_trip_through_json() {
        assert_eq!(TaskState::Cancelled.code(), 3);
        assert_eq!(serde_json::to_string(&TaskState::Completed).unwrap(), "2");
        assert_eq!(serde_json::from_str::<TaskState>("4").unwrap(), TaskState::Failed);
        assert!(serde_json::from_str::<TaskState>("9").is_err());
    }

    #[test]
    fn test_info_serializes_camel_case() {
        let info = ResponseInfo {
            task_id: "t".to_string(),
            state: TaskState::Completed,
            headers: Headers::new(),
            status: 200,
            resp_type: ResponseType::Empty,
            rnfb_encode: RnfbEncode::Path,
            redirects: vec!["http://a".to_string()],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["taskId"], "t");
        assert_eq!(json["state"], 2);
        assert_eq!(json["respType"], "");
        assert_eq!(json["rnfbEncode"], "path");
    }
}
