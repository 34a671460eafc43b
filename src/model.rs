//! Request-side data: what the caller wants the documents to declare.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configured third-party integration, keyed by its catalog id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: String,

    /// Field id -> user supplied value
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl ServiceEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Non-empty value of a field
    pub fn value(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Fill in fields that are still missing; existing values win.
    pub fn merge_missing(&mut self, other: &ServiceEntry) {
        for (field, value) in &other.values {
            let missing = self.value(field).is_none();
            if missing && !value.trim().is_empty() {
                self.values.insert(field.clone(), value.clone());
            }
        }
    }
}

/// How an iOS permission key is stored in the plist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    #[default]
    String,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionValue {
    Flag(bool),
    Text(String),
}

/// A requested iOS/macOS permission key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    #[serde(alias = "permission")]
    pub key: String,

    #[serde(default)]
    pub value: Option<PermissionValue>,

    #[serde(rename = "type", default)]
    pub kind: PermissionKind,

    /// Preprocessor macro that compiles this permission in, if any
    #[serde(rename = "macro", default, skip_serializing_if = "Option::is_none")]
    pub macro_name: Option<String>,
}

impl PermissionEntry {
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(PermissionValue::Text(value.into())),
            kind: PermissionKind::String,
            macro_name: None,
        }
    }

    pub fn flag(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: Some(PermissionValue::Flag(value)),
            kind: PermissionKind::Boolean,
            macro_name: None,
        }
    }

    /// A string entry whose description should be recovered from the document
    pub fn unset(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            kind: PermissionKind::String,
            macro_name: None,
        }
    }

    pub fn with_macro(mut self, name: impl Into<String>) -> Self {
        self.macro_name = Some(name.into());
        self
    }

    /// Explicit non-empty text value
    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            Some(PermissionValue::Text(t)) if !t.trim().is_empty() => Some(t.as_str()),
            _ => None,
        }
    }

    /// Explicit boolean value; `"true"`/`"false"` strings are accepted too
    pub fn flag_value(&self) -> Option<bool> {
        match &self.value {
            Some(PermissionValue::Flag(b)) => Some(*b),
            Some(PermissionValue::Text(t)) => match t.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            None => None,
        }
    }
}

/// Desired state for one save call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveRequest {
    /// `None` leaves the manifest's permission block alone
    pub android_permissions: Option<Vec<String>>,

    /// `None` leaves plist permission keys alone
    pub ios_permissions: Option<Vec<PermissionEntry>>,

    pub services: Vec<ServiceEntry>,
}
