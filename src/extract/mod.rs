//! Service extraction: rebuild the configured `ServiceEntry` set from the
//! documents, the inverse of the service editors.
//!
//! Sources are consulted in a fixed order (manifest, plist, app delegate,
//! entitlements) and merged per service with the first value for a field
//! winning. Sidecar files only fill identifiers still missing afterwards.

mod android;
mod ios;
mod sidecar;

pub use android::extract_from_manifest;
pub use ios::{extract_from_app_delegate, extract_from_entitlements, extract_from_plist};
pub use sidecar::SidecarValues;

use crate::android::manifest::{declared_android_permissions, package_name};
use crate::android::strings::string_resources;
use crate::applinks::{self, LinkTargets};
use crate::catalog::{Catalog, ServiceConfig};
use crate::ios::plist::declared_plist_permissions;
use crate::model::{PermissionEntry, ServiceEntry};
use std::collections::HashMap;
use tracing::debug;

/// Raw text of every document extraction may look at.
#[derive(Debug, Clone, Default)]
pub struct DocumentSources {
    pub manifest: Option<String>,
    pub strings: Option<String>,
    pub plist: Option<String>,
    pub app_delegate: Option<String>,
    pub entitlements: Option<String>,
    pub asset_links: Option<String>,
    pub site_association: Option<String>,
    pub xcode_project: Option<String>,
}

/// Permissions the documents currently declare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredPermissions {
    pub android: Vec<String>,
    pub ios: Vec<PermissionEntry>,
}

/// One entry per catalog service with at least one fragment present, in
/// catalog order.
pub fn extract_services(sources: &DocumentSources, catalog: &Catalog) -> Vec<ServiceEntry> {
    let strings = sources.strings.as_deref().map(string_resources);
    let sidecars = read_sidecars(sources);

    let mut entries = Vec::new();
    for config in &catalog.services {
        let entry = if config.id == applinks::SERVICE_ID {
            extract_app_links(sources, &sidecars)
        } else {
            extract_service(sources, strings.as_ref(), config)
        };
        if let Some(entry) = entry {
            debug!("Found configured service {}", entry.id);
            entries.push(entry);
        }
    }
    entries
}

pub fn declared_permissions(sources: &DocumentSources) -> DeclaredPermissions {
    DeclaredPermissions {
        android: sources
            .manifest
            .as_deref()
            .map(declared_android_permissions)
            .unwrap_or_default(),
        ios: sources
            .plist
            .as_deref()
            .map(declared_plist_permissions)
            .unwrap_or_default(),
    }
}

fn extract_service(
    sources: &DocumentSources,
    strings: Option<&HashMap<String, String>>,
    config: &ServiceConfig,
) -> Option<ServiceEntry> {
    let partials = [
        sources
            .manifest
            .as_deref()
            .and_then(|m| extract_from_manifest(m, strings, config)),
        sources.plist.as_deref().and_then(|p| extract_from_plist(p, config)),
        sources
            .app_delegate
            .as_deref()
            .and_then(|a| extract_from_app_delegate(a, config)),
        sources
            .entitlements
            .as_deref()
            .and_then(|e| extract_from_entitlements(e, config)),
    ];

    merge(partials)
}

fn merge<I>(partials: I) -> Option<ServiceEntry>
where
    I: IntoIterator<Item = Option<ServiceEntry>>,
{
    let mut merged: Option<ServiceEntry> = None;
    for partial in partials.into_iter().flatten() {
        match merged.as_mut() {
            Some(entry) => entry.merge_missing(&partial),
            None => merged = Some(partial),
        }
    }
    merged
}

/// App links are recognised by their marker block or `applinks:`
/// entitlements; the identifiers come from the manifest and sidecars.
fn extract_app_links(sources: &DocumentSources, sidecars: &SidecarValues) -> Option<ServiceEntry> {
    let android = sources
        .manifest
        .as_deref()
        .and_then(applinks::android::extract_app_links);
    let ios = sources
        .entitlements
        .as_deref()
        .and_then(applinks::ios::extract_app_links);

    if android.is_none() && ios.is_none() {
        return None;
    }

    let mut targets = LinkTargets::default();
    for found in [android, ios].into_iter().flatten() {
        for host in &found.hosts {
            targets.push_host(host);
        }
        for scheme in &found.schemes {
            targets.push_scheme(scheme);
        }
    }

    let mut entry = ServiceEntry::new(applinks::SERVICE_ID);
    if !targets.is_empty() {
        entry
            .values
            .insert(applinks::DOMAINS_FIELD.to_string(), targets.to_field_text());
    }

    let identifiers = [
        ("packageName", sources.manifest.as_deref().and_then(package_name)),
        ("packageName", sidecars.package_name.clone()),
        ("sha256", sidecars.sha256.clone()),
        ("teamId", sidecars.team_id.clone()),
        ("bundleId", sidecars.bundle_id.clone()),
    ];
    for (field, value) in identifiers {
        if let Some(value) = value {
            entry.values.entry(field.to_string()).or_insert(value);
        }
    }

    Some(entry)
}

fn read_sidecars(sources: &DocumentSources) -> SidecarValues {
    let mut values = SidecarValues::default();
    if let Some(json) = sources.asset_links.as_deref() {
        values.read_asset_links(json);
    }
    if let Some(json) = sources.site_association.as_deref() {
        values.read_site_association(json);
    }
    if let Some(project) = sources.xcode_project.as_deref() {
        values.read_xcode_project(project);
    }
    values
}
