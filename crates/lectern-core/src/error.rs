//! Error types for record decoding and snapshot reduction.

use thiserror::Error;

/// A single record that could not be decoded. Recovered locally: the record is
/// skipped and the reduction continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record {id} is not an object (found {found})")]
    NotAnObject { id: String, found: &'static str },

    #[error("archive entry {index} has no timestamp")]
    MissingTimestamp { index: usize },

    #[error("archive entry {index} has an unparseable timestamp: {raw}")]
    BadTimestamp { index: usize, raw: String },
}

/// A whole snapshot that a reducer cannot work with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("{reducer} reducer expects a {expected} snapshot, got a {found}")]
    UnexpectedShape {
        reducer: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ReduceError>;

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
