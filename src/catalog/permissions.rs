use crate::model::PermissionKind;
use serde::Deserialize;

/// A known Android permission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidPermission {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub dangerous: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IosPermissionCategory {
    pub category: String,

    #[serde(default)]
    pub permissions: Vec<IosPermission>,
}

/// A known iOS/macOS plist permission key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IosPermission {
    pub key: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: PermissionKind,

    /// Podfile macro for plugins that compile permissions in conditionally
    #[serde(rename = "macro", default)]
    pub macro_name: Option<String>,
}

/// Android permission list plus categorised iOS permissions.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    pub android: Vec<AndroidPermission>,
    pub ios: Vec<IosPermissionCategory>,
}

impl PermissionCatalog {
    pub fn ios_permissions(&self) -> impl Iterator<Item = &IosPermission> {
        self.ios.iter().flat_map(|c| c.permissions.iter())
    }

    pub fn ios_permission(&self, key: &str) -> Option<&IosPermission> {
        self.ios_permissions().find(|p| p.key == key)
    }

    pub fn macro_for(&self, key: &str) -> Option<&str> {
        self.ios_permission(key).and_then(|p| p.macro_name.as_deref())
    }

    pub fn android_permission(&self, name: &str) -> Option<&AndroidPermission> {
        self.android.iter().find(|p| p.name == name)
    }
}
