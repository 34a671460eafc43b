//! Read-only catalogs: known permissions and third-party service fragments.
//!
//! The catalogs are JSON documents. Built-in copies ship with the crate and
//! any of them can be replaced from disk through the `catalog` config section.

mod permissions;
mod services;

pub use permissions::{AndroidPermission, IosPermission, IosPermissionCategory, PermissionCatalog};
pub use services::{
    fill_placeholders, placeholder_pattern, placeholders, AndroidFragments, AppDelegateSpec, AttributeList,
    ElementTemplate, EntitlementSpec, FieldDef, IosFragments, MetaDataSpec, PlistEntrySpec,
    PlistValueKind, ServiceConfig, StaticValue, StringResourceSpec, UrlSchemeSpec,
};

use crate::config::CatalogPaths;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const BUILTIN_SERVICES: &str = include_str!("../../catalog/services.json");
const BUILTIN_ANDROID_PERMISSIONS: &str = include_str!("../../catalog/android_permissions.json");
const BUILTIN_IOS_PERMISSIONS: &str = include_str!("../../catalog/ios_permissions.json");

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Duplicate service id in catalog: {0}")]
    DuplicateService(String),
}

/// Everything the editors consult but never modify.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub services: Vec<ServiceConfig>,
    pub permissions: PermissionCatalog,
}

impl Catalog {
    /// The catalogs bundled with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json(
            BUILTIN_SERVICES,
            BUILTIN_ANDROID_PERMISSIONS,
            BUILTIN_IOS_PERMISSIONS,
        )
        .into_diagnostic()
        .wrap_err("Built-in catalog is invalid")
    }

    pub fn from_json(services: &str, android: &str, ios: &str) -> Result<Self, CatalogError> {
        let services: Vec<ServiceConfig> = serde_json::from_str(services)?;
        for (i, service) in services.iter().enumerate() {
            if services[..i].iter().any(|s| s.id == service.id) {
                return Err(CatalogError::DuplicateService(service.id.clone()));
            }
        }

        Ok(Self {
            services,
            permissions: PermissionCatalog {
                android: serde_json::from_str(android)?,
                ios: serde_json::from_str(ios)?,
            },
        })
    }

    /// Load catalogs, reading any configured file and falling back to the
    /// built-in copy for the rest.
    pub fn load(paths: &CatalogPaths, root: &Path) -> Result<Self> {
        let services = read_or_builtin(paths.services.as_deref(), root, BUILTIN_SERVICES)?;
        let android = read_or_builtin(
            paths.android_permissions.as_deref(),
            root,
            BUILTIN_ANDROID_PERMISSIONS,
        )?;
        let ios = read_or_builtin(paths.ios_permissions.as_deref(), root, BUILTIN_IOS_PERMISSIONS)?;

        Self::from_json(&services, &android, &ios)
            .into_diagnostic()
            .wrap_err("Failed to load catalog")
    }

    pub fn service(&self, id: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.id == id)
    }
}

fn read_or_builtin(path: Option<&Path>, root: &Path, builtin: &str) -> Result<String> {
    match path {
        Some(path) => {
            let full = root.join(path);
            debug!("Loading catalog from {}", full.display());
            std::fs::read_to_string(&full)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to read catalog file: {}", full.display()))
        }
        None => Ok(builtin.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.service("applinks").is_some());
        assert!(catalog.service("facebook").is_some());
        assert!(catalog.permissions.android_permission("android.permission.CAMERA").is_some());
        assert!(catalog.permissions.macro_for("NSCameraUsageDescription").is_some());
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let services = r#"[{"id": "a"}, {"id": "a"}]"#;
        let err = Catalog::from_json(services, "[]", "[]").unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateService(id) if id == "a"));
    }
}
