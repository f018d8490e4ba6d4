//! Extracted form records.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::template::RegionCatalog;

/// Why a field could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The region does not fit on the page.
    OutOfBounds,
    /// The OCR backend failed on the region.
    Ocr,
    /// The OCR backend did not answer in time.
    Timeout,
    /// The worker running the field died.
    Worker,
}

/// A per-field failure kept in place of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// The value of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Not extracted yet (only seen after a cancelled run).
    Pending,
    /// Normalized OCR text.
    Text(String),
    /// Checkbox state.
    Checked(bool),
    /// Extraction failed for this field.
    Unreadable(FieldFailure),
}

impl FieldValue {
    pub fn unreadable(kind: FailureKind, message: impl Into<String>) -> Self {
        FieldValue::Unreadable(FieldFailure {
            kind,
            message: message.into(),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_checked(&self) -> Option<bool> {
        match self {
            FieldValue::Checked(checked) => Some(*checked),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FieldFailure> {
        match self {
            FieldValue::Unreadable(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FieldValue::Pending)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Pending => serializer.serialize_none(),
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Checked(checked) => serializer.serialize_bool(*checked),
            FieldValue::Unreadable(failure) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("unreadable", failure)?;
                map.end()
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Pending => f.write_str("<pending>"),
            FieldValue::Text(text) => write!(f, "{:?}", text),
            FieldValue::Checked(checked) => write!(f, "{}", checked),
            FieldValue::Unreadable(failure) => write!(f, "<unreadable: {}>", failure.message),
        }
    }
}

/// Extracted values for one page, in template order.
///
/// Every template field has exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRecord {
    template: String,
    entries: Vec<(String, FieldValue)>,
}

impl FormRecord {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every field was attempted.
    pub fn is_complete(&self) -> bool {
        !self.entries.iter().any(|(_, value)| value.is_pending())
    }

    /// Number of fields that failed.
    pub fn failure_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, value)| value.failure().is_some())
            .count()
    }

    /// Every field fell outside the page: the template does not match it.
    pub fn is_template_mismatch(&self) -> bool {
        !self.entries.is_empty()
            && self.entries.iter().all(|(_, value)| {
                matches!(value, FieldValue::Unreadable(f) if f.kind == FailureKind::OutOfBounds)
            })
    }

    /// `field: value` lines, one per field.
    pub fn to_text(&self) -> String {
        let width = self.keys().map(str::len).max().unwrap_or(0);
        self.iter()
            .map(|(key, value)| format!("{:<width$}  {}\n", format!("{}:", key), value, width = width + 1))
            .collect()
    }
}

impl Serialize for FormRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Display for FormRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Starts from a catalog with every field pending and fills values in.
///
/// Each run gets its own builder, so nothing is shared between pages.
#[derive(Debug)]
pub struct RecordBuilder {
    template: String,
    entries: Vec<(String, FieldValue)>,
}

impl RecordBuilder {
    pub fn new(catalog: &RegionCatalog) -> Self {
        Self {
            template: catalog.name().to_string(),
            entries: catalog
                .ids()
                .map(|id| (id.to_string(), FieldValue::Pending))
                .collect(),
        }
    }

    /// Set a field's value. Ids outside the catalog are ignored and reported.
    pub fn set(&mut self, id: &str, value: FieldValue) -> bool {
        match self.entries.iter_mut().find(|(key, _)| key == id) {
            Some(entry) => {
                entry.1 = value;
                true
            }
            None => {
                tracing::warn!("Ignoring value for unknown field {}", id);
                false
            }
        }
    }

    pub fn finish(self) -> FormRecord {
        FormRecord {
            template: self.template,
            entries: self.entries,
        }
    }
}
