//! Repository index documents.
//!
//! An index document maps section names to ordered lists of [`Entry`]
//! records. Documents may be JSON, CBOR or YAML, optionally gzip or zstd
//! compressed. Section and entry order is preserved because it is the final
//! tie-breaker during resolution.

use std::fmt;
use std::io::Read;

use serde::de::{Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::{GZIP_MAGIC, ZSTD_MAGIC};

/// Errors produced while decoding an index document.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Decompression failed.
    #[error("Failed to decompress index: {0}")]
    Decompress(#[from] std::io::Error),

    /// The payload was not valid JSON.
    #[error("Invalid JSON index: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload was not valid CBOR.
    #[error("Invalid CBOR index: {0}")]
    Cbor(String),

    /// The payload was not valid YAML.
    #[error("Invalid YAML index: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Encoding of an index payload once decompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// `application/json`
    Json,
    /// RFC 8949 CBOR
    Cbor,
    /// YAML 1.2
    Yaml,
}

impl IndexFormat {
    /// Guess the format from a URL or file name, ignoring compression suffixes.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let path = hint.split(['?', '#']).next().unwrap_or(hint).to_lowercase();
        let path = path
            .strip_suffix(".gz")
            .or_else(|| path.strip_suffix(".zst"))
            .unwrap_or(&path);
        let ext = path.rsplit_once('.').map(|(_, e)| e)?;
        match ext {
            "json" => Some(Self::Json),
            "cbor" => Some(Self::Cbor),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Guess the format from the first significant byte of a payload.
    pub fn sniff(data: &[u8]) -> Self {
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{' | b'[') => Self::Json,
            // CBOR major types 4 (array) and 5 (map)
            Some(0x80..=0xbf) => Self::Cbor,
            _ => Self::Yaml,
        }
    }
}

/// A named, ordered group of entries within an index document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSection {
    /// Section name as published by the repository.
    pub name: String,
    /// Entries in publication order.
    pub entries: Vec<Entry>,
}

/// A decoded index document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDocument {
    /// Sections in document order.
    pub sections: Vec<IndexSection>,
}

impl IndexDocument {
    /// Decompress (by magic bytes) and decode an index payload.
    ///
    /// `hint` is the URL or file name the payload came from and selects the
    /// encoding when it carries a known extension; otherwise the payload is
    /// sniffed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when decompression or decoding fails.
    pub fn decode(data: &[u8], hint: Option<&str>) -> Result<Self, IndexError> {
        let raw = decompress(data)?;
        let format = hint
            .and_then(IndexFormat::from_hint)
            .unwrap_or_else(|| IndexFormat::sniff(&raw));

        match format {
            IndexFormat::Json => Ok(serde_json::from_slice(&raw)?),
            IndexFormat::Cbor => {
                ciborium::from_reader(raw.as_slice()).map_err(|e| IndexError::Cbor(e.to_string()))
            }
            IndexFormat::Yaml => Ok(serde_yaml::from_slice(&raw)?),
        }
    }

    /// Flatten into entries tagged with `repository`, in document order.
    pub fn into_entries(self, repository: &str) -> Vec<Entry> {
        self.sections
            .into_iter()
            .flat_map(|s| s.entries)
            .map(|mut e| {
                e.repository = repository.to_string();
                e
            })
            .collect()
    }

    /// Total number of entries across sections.
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    /// Whether the document holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decompress gzip or zstd payloads; anything else is returned as-is.
///
/// # Errors
///
/// Returns an I/O error when a compressed payload is truncated or corrupt.
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    if data.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    } else if data.starts_with(&ZSTD_MAGIC) {
        zstd::decode_all(data)
    } else {
        Ok(data.to_vec())
    }
}

impl Serialize for IndexDocument {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in &self.sections {
            map.serialize_entry(&section.name, &section.entries)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IndexDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = IndexDocument;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of section names to entry lists, or a list of entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut sections = Vec::new();
        while let Some((name, entries)) = map.next_entry::<String, Vec<Entry>>()? {
            sections.push(IndexSection { name, entries });
        }
        Ok(IndexDocument { sections })
    }

    // Single-section repositories publish a bare list.
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = seq.next_element::<Entry>()? {
            entries.push(entry);
        }
        Ok(IndexDocument {
            sections: vec![IndexSection {
                name: String::new(),
                entries,
            }],
        })
    }
}
