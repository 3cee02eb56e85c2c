//! Raw feed payloads and the identity of the four sources.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier used to keep an otherwise-empty collection addressable.
/// Never counted by any reducer.
pub const PLACEHOLDER_ID: &str = "_placeholder";

/// The four independent feeds folded into the aggregate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Book catalog collection.
    Catalog,
    /// Member / loan state collection.
    Members,
    /// Organization settings document.
    Config,
    /// Loan-history archive document.
    Archive,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Catalog,
        Source::Members,
        Source::Config,
        Source::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Catalog => "catalog",
            Source::Members => "members",
            Source::Config => "config",
            Source::Archive => "archive",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of a watched collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_ID
    }
}

/// The entire current state of a watched collection or document.
///
/// Feeds never deliver diffs; every change re-delivers the whole thing.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    Collection(Vec<Document>),
    /// `None` when the watched document does not exist.
    Document(Option<Value>),
}

impl Snapshot {
    pub fn kind(&self) -> &'static str {
        match self {
            Snapshot::Collection(_) => "collection",
            Snapshot::Document(_) => "document",
        }
    }

    /// Number of records carried, placeholder included.
    pub fn len(&self) -> usize {
        match self {
            Snapshot::Collection(docs) => docs.len(),
            Snapshot::Document(Some(_)) => 1,
            Snapshot::Document(None) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
