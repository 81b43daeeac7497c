//! Construction-time error types for the node domain.
//!
//! [`ConstructionError`] covers conditions that prevent a [`crate::ConfigGraph`]
//! from being built. Every variant is fatal: a node never starts with an
//! invalid graph. Per-message errors (decode, processing, sink, transport) are
//! defined next to the components that produce them and never escalate to
//! this type.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{NameError, NodeName};

/// The kind of named entity involved in a naming-invariant violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A top-level instrument under the node.
    Instrument,
    /// An endpoint declared inside an instrument.
    Endpoint,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instrument => f.write_str("instrument"),
            Self::Endpoint => f.write_str("endpoint"),
        }
    }
}

// ---------------------------------------------------------------------------
// Construction errors
// ---------------------------------------------------------------------------

/// Errors that prevent a configuration graph from being constructed.
///
/// No partial graph is ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// A required field is missing or has the wrong shape.
    #[error("malformed configuration document: field '{field}' {reason}")]
    MalformedDocument {
        /// Path of the offending field (e.g. `"nodename"`, `"instruments[2].name"`).
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two entities of the same kind share a name.
    ///
    /// Construction stops at the first collision.
    #[error("duplicate definition: {kind} with name '{name}' already defined (origin: {node}/{name})")]
    DuplicateName {
        /// Node whose graph was being built.
        node: NodeName,
        /// Kind of the colliding entity.
        kind: EntityKind,
        /// The colliding identifier.
        name: String,
    },

    /// A name violates the identifier format rules.
    #[error("invalid name in field '{field}'")]
    InvalidName {
        /// Path of the offending field.
        field: String,
        /// Which rule was broken.
        #[source]
        source: NameError,
    },

    /// The configuration text could not be decoded into a document.
    #[error("configuration text is not a valid document")]
    Syntax {
        /// Decoder error, preserved for diagnostics.
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration source could not be read.
    #[error("couldn't open config file {}", path.display())]
    SourceUnavailable {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error, preserved for diagnostics.
        #[source]
        source: std::io::Error,
    },
}

impl ConstructionError {
    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup errors
// ---------------------------------------------------------------------------

/// Returned when a named entity is not present in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No instrument with the requested name exists.
    #[error("no instrument named '{name}'")]
    NotFound {
        /// The requested name.
        name: String,
    },
}
