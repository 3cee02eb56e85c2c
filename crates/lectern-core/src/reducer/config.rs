//! Configuration reducer. No derived computation: the settings document is
//! taken as-is and replaces the previous one.

use super::{expect_document, Reducer, Reduction};
use crate::error::{json_kind, Result};
use crate::settings::OrgSettings;
use crate::source::{Snapshot, Source};
use serde_json::Value;
use tracing::warn;

/// A missing or non-object settings document yields empty settings.
pub fn reduce_config(document: Option<&Value>) -> OrgSettings {
    match document {
        Some(Value::Object(map)) => OrgSettings::new(map.clone()),
        Some(other) => {
            warn!(found = json_kind(other), "settings document is not an object");
            OrgSettings::default()
        }
        None => {
            warn!("settings document not found");
            OrgSettings::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigReducer;

impl Reducer for ConfigReducer {
    fn source(&self) -> Source {
        Source::Config
    }

    fn reduce(&self, snapshot: &Snapshot) -> Result<Option<Reduction>> {
        let document = expect_document("config", snapshot)?;
        Ok(Some(Reduction::new(reduce_config(document))))
    }
}
