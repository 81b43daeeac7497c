//! Newtype domain identifiers.
//!
//! Every named entity in the node hierarchy is represented as a distinct newtype
//! wrapping a `String`. This prevents accidentally interchanging, for example,
//! an [`InstrumentName`] with an [`EndpointName`] even though both are strings
//! under the hood.
//!
//! Names that form part of a routing key ([`NodeName`], [`InstrumentName`],
//! [`EndpointName`]) are *segments*: the `.` separator is reserved for routing
//! key paths and is rejected at construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the segments of a hierarchical routing key.
pub const SEGMENT_SEPARATOR: char = '.';

/// Why a value was rejected as an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The value was the empty string.
    #[error("name must not be empty")]
    Empty,

    /// The value contains the reserved routing-key separator.
    #[error("name '{value}' contains the reserved separator '.'")]
    ContainsSeparator {
        /// The rejected value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() rejecting empty values, as_str(), Display, Borrow<str>.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, rejecting the empty string.
            pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
                let v = value.into();
                if v.is_empty() {
                    return Err(NameError::Empty);
                }
                Ok(Self(v))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for routing-key segment names.
// Same surface as `string_id!`, but new() also rejects the separator.
// ---------------------------------------------------------------------------
macro_rules! segment_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        string_id! {
            $(#[$attr])*
            $name
        }

        impl $name {
            /// Creates a new segment identifier, rejecting empty values and
            /// values containing [`SEGMENT_SEPARATOR`].
            pub fn segment(value: impl Into<String>) -> Result<Self, NameError> {
                let id = Self::new(value)?;
                if id.0.contains(SEGMENT_SEPARATOR) {
                    return Err(NameError::ContainsSeparator { value: id.0 });
                }
                Ok(id)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: routing-key segments
// ---------------------------------------------------------------------------

segment_id! {
    /// Identifies the node that owns a configuration graph (`nodename`).
    NodeName
}

segment_id! {
    /// Identifies an instrument (a named, typed sub-entity under a node).
    ///
    /// Instrument names are unique per node.
    InstrumentName
}

segment_id! {
    /// Identifies an endpoint declared inside an instrument's `endpoints` list.
    ///
    /// Endpoint names are unique across the whole node, not just within their
    /// owning instrument.
    EndpointName
}

// ---------------------------------------------------------------------------
// Identifiers: transport names
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies the exchange routing keys are bound on (e.g. `"alerts"`).
    ExchangeName
}

string_id! {
    /// Human-readable consumer name used in spans and logs.
    ConsumerName
}

/// Opaque connection descriptor for the external transport (`broker`).
///
/// Never interpreted by this crate; stored verbatim, periods included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerAddress(String);

impl BrokerAddress {
    /// Wraps a broker descriptor without validation.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the descriptor as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
