//! Shared value types for the node domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structured values: per-instrument configuration data, wire encodings and
//! wall-clock timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Instrument data
// ---------------------------------------------------------------------------

/// Configuration of a single instrument, minus its `name` key.
///
/// The shape is deliberately left open: the instrument's own module defines
/// which keys it understands. The only key interpreted by this crate is
/// `endpoints`, whose entry names are checked for uniqueness when the
/// [`crate::ConfigGraph`] is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentData(serde_yaml::Mapping);

impl InstrumentData {
    /// Wraps an already-validated mapping.
    pub fn new(mapping: serde_yaml::Mapping) -> Self {
        Self(mapping)
    }

    /// Looks up a top-level key of the instrument descriptor.
    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.0.get(key)
    }

    /// Returns the underlying mapping.
    pub fn as_mapping(&self) -> &serde_yaml::Mapping {
        &self.0
    }

    /// Number of keys in the descriptor.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the descriptor has no keys besides its name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Wire encoding
// ---------------------------------------------------------------------------

/// Content encodings understood by the message decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    /// `application/json`
    Json,
}

impl ContentEncoding {
    /// Resolves a transport-supplied content-encoding hint.
    ///
    /// Matching is case-insensitive and ignores parameters after `;`
    /// (e.g. `application/json; charset=utf-8`). Returns `None` for
    /// encodings this crate cannot decode.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let mime = hint.split(';').next().unwrap_or_default().trim();
        if mime.eq_ignore_ascii_case("application/json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// Canonical MIME type for this encoding.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
        }
    }
}

impl std::fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly. Serialised as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 string (e.g. `"2024-05-01T12:00:00Z"`).
    pub fn parse_rfc3339(value: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(value).map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
