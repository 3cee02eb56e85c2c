//! Organization settings: an opaque, replace-on-write record with typed read
//! accessors for the keys the dashboard knows about.

use chrono::{DateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Version stamped on exported configuration files.
pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgSettings {
    raw: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub primary: String,
    pub secondary: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub facebook: Option<String>,
    pub instagram: Option<String>,
}

/// Opening hours for one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayHours {
    Open { open: String, close: String },
    Closed,
}

impl OrgSettings {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.raw
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("Name")
    }

    pub fn address(&self) -> Option<&str> {
        self.str_field("Address")
    }

    pub fn logo(&self) -> Option<&str> {
        self.str_field("Logo")
    }

    pub fn maintenance_mode(&self) -> bool {
        self.raw
            .get("MaintenanceMode")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn theme(&self) -> Option<Theme> {
        let theme = self.raw.get("Theme")?.as_object()?;
        Some(Theme {
            primary: theme.get("Primary")?.as_str()?.to_string(),
            secondary: theme.get("Secondary")?.as_str()?.to_string(),
        })
    }

    pub fn contact(&self) -> Contact {
        let Some(contact) = self.raw.get("Contact").and_then(Value::as_object) else {
            return Contact::default();
        };
        let field = |key: &str| contact.get(key).and_then(Value::as_str).map(str::to_string);
        Contact {
            email: field("Email"),
            phone: field("Phone"),
            whatsapp: field("WhatsApp"),
            facebook: field("Facebook"),
            instagram: field("Instagram"),
        }
    }

    pub fn maximum_simultaneous_loans(&self) -> Option<u64> {
        self.raw
            .get("MaximumSimultaneousLoans")
            .and_then(Value::as_u64)
    }

    /// Default loan duration in days.
    pub fn default_loan_duration(&self) -> Option<u64> {
        self.raw.get("DefaultLoanDuration").and_then(Value::as_u64)
    }

    pub fn late_return_penalties(&self) -> Vec<String> {
        self.string_list("LateReturnPenalties")
    }

    pub fn specific_borrowing_rules(&self) -> Vec<String> {
        self.string_list("SpecificBorrowingRules")
    }

    /// Day name to hours. Days with an unrecognised value are left out.
    pub fn opening_hours(&self) -> BTreeMap<String, DayHours> {
        let Some(days) = self.raw.get("OpeningHours").and_then(Value::as_object) else {
            return BTreeMap::new();
        };
        days.iter()
            .filter_map(|(day, hours)| {
                let parsed = match hours {
                    Value::String(s) if s == "closed" => DayHours::Closed,
                    Value::Object(h) => DayHours::Open {
                        open: h.get("open")?.as_str()?.to_string(),
                        close: h.get("close")?.as_str()?.to_string(),
                    },
                    _ => return None,
                };
                Some((day.clone(), parsed))
            })
            .collect()
    }

    /// The settings as an exportable document stamped with export time and version.
    pub fn export<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Value
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = self.raw.clone();
        out.insert(
            "exported_at".to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        out.insert(
            "version".to_string(),
            Value::String(EXPORT_VERSION.to_string()),
        );
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn settings(v: Value) -> OrgSettings {
        OrgSettings::new(v.as_object().cloned().unwrap())
    }

    #[test]
    fn test_typed_accessors() {
        let s = settings(json!({
            "Name": "Bibliothèque Centrale",
            "MaintenanceMode": true,
            "Theme": {"Primary": "#123456", "Secondary": "#abcdef"},
            "Contact": {"Email": "contact@biblio.org"},
            "MaximumSimultaneousLoans": 3,
            "LateReturnPenalties": ["100 FCFA / jour", 5],
            "OpeningHours": {"Lundi": {"open": "08:00", "close": "18:00"}, "Dimanche": "closed", "Mardi": 1}
        }));

        assert_eq!(s.name(), Some("Bibliothèque Centrale"));
        assert!(s.maintenance_mode());
        assert_eq!(s.theme().unwrap().primary, "#123456");
        assert_eq!(s.contact().email.as_deref(), Some("contact@biblio.org"));
        assert_eq!(s.maximum_simultaneous_loans(), Some(3));
        assert_eq!(s.late_return_penalties(), vec!["100 FCFA / jour".to_string()]);

        let hours = s.opening_hours();
        assert_eq!(hours.len(), 2);
        assert_eq!(hours["Dimanche"], DayHours::Closed);
    }

    #[test]
    fn test_empty_settings_defaults() {
        let s = OrgSettings::default();
        assert!(s.is_empty());
        assert!(!s.maintenance_mode());
        assert!(s.theme().is_none());
        assert!(s.specific_borrowing_rules().is_empty());
    }

    #[test]
    fn test_export_stamps_metadata() {
        let s = settings(json!({"Name": "B"}));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let out = s.export(&now);

        assert_eq!(out["Name"], "B");
        assert_eq!(out["version"], EXPORT_VERSION);
        assert_eq!(out["exported_at"], "2026-03-01T12:00:00.000Z");
    }
}
