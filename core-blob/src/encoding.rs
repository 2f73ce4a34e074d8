//! # Payload Encodings
//!
//! File contents and stream chunks cross the API as either text or a list of
//! byte values. [`Encoding`] tags how text maps to bytes:
//!
//! - `utf8`: text is the UTF-8 content itself
//! - `base64`: text is standard padded base64
//! - `ascii`: bytes are handed out raw; text input must be pure ASCII
//! - `uri`: text is a path whose file supplies the bytes (write side only)

use crate::error::{BlobError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Base64,
    Uri,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Ascii => "ascii",
            Encoding::Base64 => "base64",
            Encoding::Uri => "uri",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "ascii" => Ok(Encoding::Ascii),
            "base64" => Ok(Encoding::Base64),
            "uri" => Ok(Encoding::Uri),
            other => Err(BlobError::Encoding(format!("Unknown encoding: {}", other))),
        }
    }
}

/// Data exchanged with callers: a text chunk or raw byte values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

/// Render bytes read from disk or the network for the caller.
pub fn encode(bytes: &[u8], encoding: Encoding) -> Result<Payload> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(bytes)
            .map(|text| Payload::Text(text.to_string()))
            .map_err(|e| BlobError::Encoding(format!("Content is not valid UTF-8: {}", e))),
        Encoding::Base64 => Ok(Payload::Text(STANDARD.encode(bytes))),
        Encoding::Ascii => Ok(Payload::Bytes(bytes.to_vec())),
        Encoding::Uri => Err(BlobError::Encoding(
            "The uri encoding only applies to writes".to_string(),
        )),
    }
}

/// Turn caller-provided data into the bytes to store or send.
///
/// `Uri` payloads name a source file and must be resolved by the caller
/// before reaching this function.
pub fn decode(payload: &Payload, encoding: Encoding) -> Result<Vec<u8>> {
    match (payload, encoding) {
        (Payload::Text(_), Encoding::Uri) | (Payload::Bytes(_), Encoding::Uri) => {
            Err(BlobError::Encoding(
                "uri payloads name a source file and cannot be decoded inline".to_string(),
            ))
        }
        (Payload::Text(text), Encoding::Utf8) => Ok(text.as_bytes().to_vec()),
        (Payload::Text(text), Encoding::Base64) => Ok(STANDARD.decode(text.trim())?),
        (Payload::Text(text), Encoding::Ascii) => {
            if text.is_ascii() {
                Ok(text.as_bytes().to_vec())
            } else {
                Err(BlobError::Encoding(
                    "Text contains non-ASCII characters".to_string(),
                ))
            }
        }
        (Payload::Bytes(_), Encoding::Base64) => Err(BlobError::Encoding(
            "base64 encoding expects text, got byte values".to_string(),
        )),
        (Payload::Bytes(bytes), _) => Ok(bytes.clone()),
    }
}

/// Incremental UTF-8 decoder that never splits a code point.
///
/// Trailing bytes of an incomplete sequence are held back until the next
/// chunk arrives.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the text that is complete so far.
    pub fn push(&mut self, chunk: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                Ok(text)
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let rest = self.pending.split_off(valid);
                let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))
                    .map_err(|e| BlobError::Encoding(e.to_string()))?;
                Ok(text)
            }
            Err(e) => Err(BlobError::Encoding(format!(
                "Content is not valid UTF-8: {}",
                e
            ))),
        }
    }

    /// Flush at end of input; leftover bytes mean the input was truncated.
    pub fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(BlobError::Encoding(format!(
                "Input ended inside a UTF-8 sequence ({} dangling bytes)",
                self.pending.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoding() {
        assert_eq!("UTF8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("base64".parse::<Encoding>().unwrap(), Encoding::Base64);
        assert_eq!("ascii".parse::<Encoding>().unwrap(), Encoding::Ascii);
        assert_eq!("uri".parse::<Encoding>().unwrap(), Encoding::Uri);
        assert!("latin1".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_encode_variants() {
        assert_eq!(
            encode(b"hello", Encoding::Utf8).unwrap(),
            Payload::Text("hello".into())
        );
        assert_eq!(
            encode(b"hello", Encoding::Base64).unwrap(),
            Payload::Text("aGVsbG8=".into())
        );
        assert_eq!(
            encode(&[0, 200, 65], Encoding::Ascii).unwrap(),
            Payload::Bytes(vec![0, 200, 65])
        );
        assert!(encode(&[0xff, 0xfe], Encoding::Utf8).is_err());
        assert!(encode(b"x", Encoding::Uri).is_err());
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(decode(&"héllo".into(), Encoding::Utf8).unwrap(), "héllo".as_bytes());
        assert_eq!(decode(&"aGVsbG8=".into(), Encoding::Base64).unwrap(), b"hello");
        assert!(matches!(
            decode(&"not base64!".into(), Encoding::Base64),
            Err(BlobError::Base64(_))
        ));
        assert_eq!(decode(&"abc".into(), Encoding::Ascii).unwrap(), b"abc");
        assert!(decode(&"é".into(), Encoding::Ascii).is_err());
        assert_eq!(
            decode(&Payload::Bytes(vec![1, 2, 3]), Encoding::Ascii).unwrap(),
            vec![1, 2, 3]
        );
        assert!(decode(&Payload::Bytes(vec![1]), Encoding::Base64).is_err());
        assert!(decode(&"/tmp/a".into(), Encoding::Uri).is_err());
    }

    #[test]
    fn test_utf8_decoder_holds_partial_code_points() {
        let bytes = "añ€".as_bytes();
        let mut decoder = Utf8Decoder::new();

        // Split in the middle of 'ñ' (2 bytes) and '€' (3 bytes)
        assert_eq!(decoder.push(&bytes[..2]).unwrap(), "a");
        assert_eq!(decoder.push(&bytes[2..4]).unwrap(), "ñ");
        assert_eq!(decoder.push(&bytes[4..]).unwrap(), "€");
        decoder.finish().unwrap();
    }

    #[test]
    fn test_utf8_decoder_rejects_invalid_and_truncated() {
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.push(&[b'a', 0xff, b'b']).is_err());

        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(&[0xe2, 0x82]).unwrap(), "");
        assert!(decoder.finish().is_err());
    }
}
