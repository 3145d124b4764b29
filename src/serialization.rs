//! Serializer registry.
//!
//! A backend picks one [`SerializerKind`] at construction and keeps it for
//! its lifetime. Four kinds are built in:
//!
//! | kind     | encode                                   | decode                 |
//! |----------|------------------------------------------|------------------------|
//! | `json`   | JSON text of the value                   | parsed JSON            |
//! | `binary` | postcard payload in a versioned envelope | any `CacheValue`       |
//! | `string` | `Display` form, UTF-8                    | `CacheValue::Text`     |
//! | `bytes`  | identity for `CacheValue::Bytes`         | `CacheValue::Bytes`    |
//!
//! # Binary envelope
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: 4 bytes, little endian] [POSTCARD PAYLOAD]
//! ```
//!
//! The envelope makes corrupted or foreign bytes fail loudly instead of
//! decoding into garbage.

use crate::error::{Error, Result};
use crate::value::CacheValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Magic header of the binary envelope.
pub const CACHE_MAGIC: [u8; 4] = *b"MCHE";

/// Schema version of the binary envelope. Bump when `CacheValue` changes shape.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Built-in serializer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Structured text.
    #[default]
    Json,
    /// Generic binary; round-trips every value including byte strings.
    #[serde(alias = "pickle")]
    Binary,
    /// Plain string form.
    #[serde(alias = "str")]
    String,
    /// Raw bytes only.
    Bytes,
}

impl SerializerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializerKind::Json => "json",
            SerializerKind::Binary => "binary",
            SerializerKind::String => "string",
            SerializerKind::Bytes => "bytes",
        }
    }

    /// Whether encoded payloads are always valid UTF-8.
    pub fn is_text(&self) -> bool {
        matches!(self, SerializerKind::Json | SerializerKind::String)
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SerializerKind::Json),
            "binary" | "pickle" => Ok(SerializerKind::Binary),
            "string" | "str" => Ok(SerializerKind::String),
            "bytes" => Ok(SerializerKind::Bytes),
            other => Err(Error::configuration(format!("unsupported serializer: {}", other))
                .with_config_section("serializer")
                .with_config_value(other)),
        }
    }
}

/// Encode/decode pair resolved from a [`SerializerKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serializer {
    kind: SerializerKind,
}

impl Serializer {
    pub fn new(kind: SerializerKind) -> Self {
        Serializer { kind }
    }

    /// Resolve a serializer by name.
    ///
    /// # Errors
    /// Returns a configuration error for unknown names.
    pub fn by_name(name: &str) -> Result<Self> {
        Ok(Serializer::new(name.parse()?))
    }

    pub fn kind(&self) -> SerializerKind {
        self.kind
    }

    /// Encode a value to bytes.
    ///
    /// # Errors
    /// Returns a serialization error if the value is not supported by this
    /// kind (bytes under `json`, anything but bytes under `bytes`).
    pub fn encode(&self, value: &CacheValue) -> Result<Vec<u8>> {
        match self.kind {
            SerializerKind::Json => Ok(serde_json::to_vec(&value.to_json()?)?),
            SerializerKind::Binary => {
                let payload = postcard::to_allocvec(value)?;
                let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
                bytes.extend_from_slice(&CACHE_MAGIC);
                bytes.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
                bytes.extend_from_slice(&payload);
                Ok(bytes)
            }
            SerializerKind::String => Ok(value.to_string().into_bytes()),
            SerializerKind::Bytes => match value {
                CacheValue::Bytes(b) => Ok(b.clone()),
                other => Err(Error::serialization(format!(
                    "bytes serializer expects a byte string, got {}",
                    variant_name(other)
                ))),
            },
        }
    }

    /// Decode bytes produced by [`Serializer::encode`].
    ///
    /// # Errors
    /// Returns a serialization error for malformed input.
    pub fn decode(&self, bytes: &[u8]) -> Result<CacheValue> {
        match self.kind {
            SerializerKind::Json => {
                let json: serde_json::Value = serde_json::from_slice(bytes)?;
                Ok(CacheValue::from(json))
            }
            SerializerKind::Binary => {
                if bytes.len() < HEADER_LEN {
                    return Err(Error::serialization(format!(
                        "binary payload too short: {} bytes",
                        bytes.len()
                    )));
                }
                let (header, payload) = bytes.split_at(HEADER_LEN);
                if header[..4] != CACHE_MAGIC {
                    return Err(Error::serialization("invalid binary envelope magic"));
                }
                let mut version = [0u8; 4];
                version.copy_from_slice(&header[4..]);
                let version = u32::from_le_bytes(version);
                if version != CURRENT_SCHEMA_VERSION {
                    return Err(Error::serialization(format!(
                        "schema version mismatch: expected {}, found {}",
                        CURRENT_SCHEMA_VERSION, version
                    )));
                }
                Ok(postcard::from_bytes(payload)?)
            }
            SerializerKind::String => String::from_utf8(bytes.to_vec())
                .map(CacheValue::Text)
                .map_err(|e| Error::serialization("payload is not valid UTF-8").with_source(e)),
            SerializerKind::Bytes => Ok(CacheValue::Bytes(bytes.to_vec())),
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer::new(SerializerKind::default())
    }
}

fn variant_name(value: &CacheValue) -> &'static str {
    match value {
        CacheValue::Null => "null",
        CacheValue::Bool(_) => "bool",
        CacheValue::Int(_) => "int",
        CacheValue::Float(_) => "float",
        CacheValue::Text(_) => "text",
        CacheValue::Bytes(_) => "bytes",
        CacheValue::List(_) => "list",
        CacheValue::Map(_) => "map",
    }
}
