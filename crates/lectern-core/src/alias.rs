//! Ordered alias lists for fields that were spelled several ways over the life
//! of the backing store.
//!
//! Every logical field has exactly one [`FieldAliases`] entry. Resolution walks
//! the aliases in order; nothing else in the crate probes record keys directly.

use serde_json::{Map, Value};

/// A logical field and the raw keys it may be stored under, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldAliases {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
}

pub const CATEGORY: FieldAliases = FieldAliases {
    field: "category",
    aliases: &["Cathegorie", "categorie", "Category"],
};

pub const TITLE: FieldAliases = FieldAliases {
    field: "title",
    aliases: &["Nom", "nom", "title"],
};

pub const INITIAL_COPIES: FieldAliases = FieldAliases {
    field: "initialCopies",
    aliases: &["initialExemplaire", "InitialExemplaire"],
};

pub const AVAILABLE_COPIES: FieldAliases = FieldAliases {
    field: "availableCopies",
    aliases: &["Exemplaire", "exemplaire"],
};

pub const SUSPENSION: FieldAliases = FieldAliases {
    field: "suspension",
    aliases: &["Etat1", "etat"],
};

pub const CREATED_AT: FieldAliases = FieldAliases {
    field: "createdAt",
    aliases: &["createdAt", "dateAjout"],
};

pub const ARCHIVE_ENTRIES: FieldAliases = FieldAliases {
    field: "entries",
    aliases: &["tableauArchives"],
};

pub const ARCHIVE_TIMESTAMP: FieldAliases = FieldAliases {
    field: "timestamp",
    aliases: &["heure"],
};

pub const ARCHIVE_DOCUMENT: FieldAliases = FieldAliases {
    field: "document",
    aliases: &["nomDoc"],
};

/// Display label for a record with no category.
pub const UNCLASSIFIED: &str = "Non classé";

/// Display label for a record with no title.
pub const UNTITLED: &str = "Sans titre";

/// JavaScript-style truthiness, which is how the legacy writers decided whether
/// a field was "set".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl FieldAliases {
    /// First alias holding a non-empty string.
    pub fn string<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a str> {
        self.aliases
            .iter()
            .filter_map(|key| record.get(*key))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
    }

    /// First alias holding a truthy value of any type.
    pub fn truthy<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        self.aliases
            .iter()
            .filter_map(|key| record.get(*key))
            .find(|v| is_truthy(v))
    }

    /// Integer count from the first truthy alias. A truthy value that is not a
    /// number contributes zero instead of falling through.
    pub fn count(&self, record: &Map<String, Value>) -> i64 {
        match self.truthy(record) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Whether any alias holds exactly `sentinel`.
    pub fn any_equals(&self, record: &Map<String, Value>, sentinel: &str) -> bool {
        self.aliases
            .iter()
            .filter_map(|key| record.get(*key))
            .any(|v| v.as_str() == Some(sentinel))
    }

    /// Any present alias, truthy or not.
    pub fn raw<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a Value> {
        self.aliases.iter().find_map(|key| record.get(*key))
    }
}
