//! Save orchestration.
//!
//! A save reads the current documents through a [`DocumentStore`], runs the
//! permission and service editors against the requested state and writes back
//! only the documents whose text changed. What was configured before the save
//! arrives explicitly through [`SaveContext`], so the editors stay pure.

mod store;

pub use store::{DocumentStore, FsStore, MemoryStore, StoreError};

use crate::android::manifest::update_manifest;
use crate::android::services::{self as android_services, AndroidDocuments};
use crate::applinks::{self, LinkTargets};
use crate::catalog::{Catalog, ServiceConfig};
use crate::discovery::ProjectLayout;
use crate::extract::DocumentSources;
use crate::ios::plist::{remove_plist_keys, update_plist};
use crate::ios::podfile::{patch_podfile, required_macros};
use crate::ios::services::{self as ios_services, IosDocuments};
use crate::model::{SaveRequest, ServiceEntry};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the caller knew before this save.
#[derive(Debug, Clone)]
pub struct SaveContext<'a> {
    pub catalog: &'a Catalog,

    /// Services configured before this save; ids missing from the request
    /// are removed
    pub previous_services: Vec<ServiceEntry>,

    /// Plist permission keys managed by the previous save; keys missing from
    /// the request are deleted
    pub previous_ios_permissions: Vec<String>,

    /// Indentation unit for inserted manifest elements
    pub indent: String,
}

impl<'a> SaveContext<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            previous_services: Vec::new(),
            previous_ios_permissions: Vec::new(),
            indent: "    ".to_string(),
        }
    }

    fn previous(&self, id: &str) -> Option<&ServiceEntry> {
        self.previous_services.iter().find(|s| s.id == id)
    }

    /// The previous entry for a service whose field values changed
    fn changed(&self, config: &ServiceConfig, entry: &ServiceEntry) -> Option<&ServiceEntry> {
        self.previous(&entry.id)
            .filter(|previous| config.values_differ(previous, entry))
    }

    /// Previously configured services the request no longer lists
    fn removed_services<'r>(&'r self, request: &'r SaveRequest) -> impl Iterator<Item = &'r ServiceEntry> {
        self.previous_services
            .iter()
            .filter(move |prev| !request.services.iter().any(|s| s.id == prev.id))
    }
}

/// Result of one save call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,

    /// Documents whose text was written
    pub written: Vec<PathBuf>,
}

impl SaveOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            written: Vec::new(),
        }
    }
}

/// Read every document in `layout` that exists.
pub fn load_sources<S: DocumentStore + ?Sized>(layout: &ProjectLayout, store: &S) -> DocumentSources {
    let read = |path: &Option<PathBuf>| path.as_deref().and_then(|p| store.read(p));
    DocumentSources {
        manifest: read(&layout.manifest),
        strings: read(&layout.strings),
        plist: read(&layout.plist),
        app_delegate: read(&layout.app_delegate),
        entitlements: read(&layout.entitlements),
        asset_links: read(&layout.asset_links),
        site_association: read(&layout.site_association),
        xcode_project: read(&layout.xcode_project),
    }
}

/// Apply `request` to the project and persist the changed documents.
///
/// Fails only when neither an Android manifest nor an Info.plist exists, or
/// when writing one of the primary documents fails. A declined write skips
/// that document. Podfile problems are logged and never affect the outcome.
pub fn save<S: DocumentStore + ?Sized>(
    request: &SaveRequest,
    ctx: &SaveContext<'_>,
    layout: &ProjectLayout,
    store: &mut S,
) -> SaveOutcome {
    let sources = load_sources(layout, store);
    if sources.manifest.is_none() && sources.plist.is_none() {
        return SaveOutcome::failure("No AndroidManifest.xml or Info.plist found in the project");
    }

    let mut pending: Vec<(PathBuf, Option<String>, String)> = Vec::new();

    if let (Some(path), Some(manifest)) = (layout.manifest.as_ref(), sources.manifest.as_ref()) {
        let docs = AndroidDocuments {
            manifest: manifest.clone(),
            strings: sources.strings.clone(),
        };
        let updated = save_android(request, ctx, docs);
        pending.push((path.clone(), Some(manifest.clone()), updated.manifest));
        if let (Some(path), Some(strings)) = (layout.strings.as_ref(), updated.strings) {
            pending.push((path.clone(), sources.strings.clone(), strings));
        }
    }

    if let (Some(path), Some(plist)) = (layout.plist.as_ref(), sources.plist.as_ref()) {
        let docs = IosDocuments {
            plist: plist.clone(),
            entitlements: sources.entitlements.clone(),
            app_delegate: sources.app_delegate.clone(),
        };
        let updated = save_ios(request, ctx, docs);
        pending.push((path.clone(), Some(plist.clone()), updated.plist));
        if let (Some(path), Some(text)) = (layout.app_delegate.as_ref(), updated.app_delegate) {
            pending.push((path.clone(), sources.app_delegate.clone(), text));
        }
        if let (Some(path), Some(text)) = (layout.entitlements_target(), updated.entitlements) {
            pending.push((path, sources.entitlements.clone(), text));
        }
    }

    let mut written = Vec::new();
    for (path, before, after) in pending {
        if before.as_deref() == Some(after.as_str()) {
            debug!("{} unchanged", path.display());
            continue;
        }
        match store.write(&path, &after) {
            Ok(()) => written.push(path),
            Err(StoreError::Declined(path)) => info!("Skipped {}", path.display()),
            Err(e) => {
                return SaveOutcome {
                    success: false,
                    message: format!("Failed to save {}: {}", path.display(), e),
                    written,
                };
            }
        }
    }

    if let Some(path) = save_podfile(request, ctx, layout, store) {
        written.push(path);
    }

    let message = if written.is_empty() {
        "No changes needed".to_string()
    } else {
        format!("Saved {} document(s)", written.len())
    };
    info!("{}", message);

    SaveOutcome {
        success: true,
        message,
        written,
    }
}

fn save_android(request: &SaveRequest, ctx: &SaveContext<'_>, mut docs: AndroidDocuments) -> AndroidDocuments {
    if let Some(permissions) = &request.android_permissions {
        docs.manifest = update_manifest(&docs.manifest, permissions, &ctx.indent);
    }

    for previous in ctx.removed_services(request) {
        if previous.id == applinks::SERVICE_ID {
            docs.manifest = applinks::android::remove_app_links(&docs.manifest);
        } else if let Some(config) = ctx.catalog.service(&previous.id) {
            docs = android_services::remove_service(&docs, config, Some(previous));
        }
    }

    for entry in &request.services {
        if entry.id == applinks::SERVICE_ID {
            let targets = LinkTargets::from_entry(entry);
            docs.manifest = applinks::android::apply_app_links(&docs.manifest, &targets, &ctx.indent);
        } else if let Some(config) = ctx.catalog.service(&entry.id) {
            // Templated elements are matched by name, so changed values need a fresh copy
            if let Some(previous) = ctx.changed(config, entry) {
                docs = android_services::remove_service(&docs, config, Some(previous));
            }
            docs = android_services::add_service(&docs, config, entry, &ctx.indent);
        } else {
            warn!("Unknown service id {}, skipping", entry.id);
        }
    }

    docs
}

fn save_ios(request: &SaveRequest, ctx: &SaveContext<'_>, mut docs: IosDocuments) -> IosDocuments {
    if let Some(entries) = &request.ios_permissions {
        let dropped: Vec<&String> = ctx
            .previous_ios_permissions
            .iter()
            .filter(|key| !entries.iter().any(|e| &e.key == *key))
            .collect();
        if !dropped.is_empty() {
            debug!("Removing {} plist permission key(s)", dropped.len());
            docs.plist = remove_plist_keys(&docs.plist, &dropped);
        }
        docs.plist = update_plist(&docs.plist, entries);
    }

    for previous in ctx.removed_services(request) {
        if previous.id == applinks::SERVICE_ID {
            let targets = LinkTargets::from_entry(previous);
            docs = applinks::ios::remove_app_links(&docs, Some(&targets));
        } else if let Some(config) = ctx.catalog.service(&previous.id) {
            docs = ios_services::remove_service(&docs, config, Some(previous));
        }
    }

    for entry in &request.services {
        if entry.id == applinks::SERVICE_ID {
            let targets = LinkTargets::from_entry(entry);
            let previous = ctx.previous(&entry.id).map(LinkTargets::from_entry);
            docs = applinks::ios::apply_app_links(&docs, &targets, previous.as_ref());
        } else if let Some(config) = ctx.catalog.service(&entry.id) {
            // Drop fragments keyed on values that changed since last time
            if let Some(previous) = ctx.changed(config, entry) {
                docs = ios_services::remove_service(&docs, config, Some(previous));
            }
            docs = ios_services::add_service(&docs, config, entry);
        }
    }

    docs
}

/// Keep the Podfile macros in line with the requested plist permissions.
/// Returns the path when the Podfile was written.
fn save_podfile<S: DocumentStore + ?Sized>(
    request: &SaveRequest,
    ctx: &SaveContext<'_>,
    layout: &ProjectLayout,
    store: &mut S,
) -> Option<PathBuf> {
    let entries = request.ios_permissions.as_ref()?;
    let path = layout.podfile.as_deref()?;
    let Some(content) = store.read(path) else {
        warn!("Podfile {} could not be read", path.display());
        return None;
    };

    let macros = required_macros(entries, &ctx.catalog.permissions);
    let patched = match patch_podfile(&content, &macros) {
        Ok(patched) => patched,
        Err(e) => {
            warn!("Podfile not updated: {}", e);
            return None;
        }
    };
    if patched == content {
        return None;
    }

    write_podfile(store, path, &patched)
}

fn write_podfile<S: DocumentStore + ?Sized>(store: &mut S, path: &Path, content: &str) -> Option<PathBuf> {
    match store.write(path, content) {
        Ok(()) => Some(path.to_path_buf()),
        Err(StoreError::Declined(_)) => None,
        Err(e) => {
            warn!("Podfile not updated: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ios::plist::TODO_DESCRIPTION;
    use crate::model::PermissionEntry;

    const MANIFEST: &str = "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\">\n    <application android:label=\"demo\">\n    </application>\n</manifest>\n";
    const PLIST: &str = "<plist version=\"1.0\">\n<dict>\n\t<key>CFBundleName</key>\n\t<string>demo</string>\n</dict>\n</plist>\n";

    fn layout() -> ProjectLayout {
        ProjectLayout {
            root: PathBuf::from("/p"),
            manifest: Some(PathBuf::from("/p/AndroidManifest.xml")),
            plist: Some(PathBuf::from("/p/Runner/Info.plist")),
            podfile: Some(PathBuf::from("/p/Podfile")),
            ..Default::default()
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with("/p/AndroidManifest.xml", MANIFEST)
            .with("/p/Runner/Info.plist", PLIST)
            .with("/p/Podfile", "")
    }

    #[test]
    fn test_missing_documents_fail() {
        let catalog = Catalog::builtin().unwrap();
        let ctx = SaveContext::new(&catalog);
        let outcome = save(&SaveRequest::default(), &ctx, &layout(), &mut MemoryStore::new());
        assert!(!outcome.success);
    }

    #[test]
    fn test_save_permissions_and_podfile() {
        let catalog = Catalog::builtin().unwrap();
        let ctx = SaveContext::new(&catalog);
        let request = SaveRequest {
            android_permissions: Some(vec!["CAMERA".to_string()]),
            ios_permissions: Some(vec![PermissionEntry::text("NSCameraUsageDescription", "Scan")]),
            services: vec![],
        };
        let mut store = store();

        let outcome = save(&request, &ctx, &layout(), &mut store);
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.written.len(), 3);
        assert!(store
            .get("/p/AndroidManifest.xml")
            .unwrap()
            .contains("<uses-permission android:name=\"android.permission.CAMERA\" />"));
        assert!(store.get("/p/Runner/Info.plist").unwrap().contains("<string>Scan</string>"));
        assert!(store.get("/p/Podfile").unwrap().contains("'PERMISSION_CAMERA=1'"));

        let again = save(&request, &ctx, &layout(), &mut store);
        assert!(again.success);
        assert!(again.written.is_empty());
    }

    #[test]
    fn test_removed_ios_permission_is_deleted() {
        let catalog = Catalog::builtin().unwrap();
        let mut store = store();
        let first = SaveRequest {
            ios_permissions: Some(vec![PermissionEntry::text("NSCameraUsageDescription", "reason A")]),
            ..Default::default()
        };
        save(&first, &SaveContext::new(&catalog), &layout(), &mut store);

        let mut ctx = SaveContext::new(&catalog);
        ctx.previous_ios_permissions = vec!["NSCameraUsageDescription".to_string()];
        let second = SaveRequest {
            ios_permissions: Some(vec![]),
            ..Default::default()
        };
        save(&second, &ctx, &layout(), &mut store);
        assert!(!store.get("/p/Runner/Info.plist").unwrap().contains("NSCameraUsageDescription"));
    }

    fn camera(value: &str) -> SaveRequest {
        SaveRequest {
            ios_permissions: Some(vec![PermissionEntry::text("NSCameraUsageDescription", value)]),
            ..Default::default()
        }
    }

    fn no_ios_permissions() -> SaveRequest {
        SaveRequest {
            ios_permissions: Some(vec![]),
            ..Default::default()
        }
    }

    #[test]
    fn test_unmanaged_description_recovered_after_toggle() {
        let catalog = Catalog::builtin().unwrap();
        let mut store = store();
        let ctx = SaveContext::new(&catalog);

        save(&camera("reason A"), &ctx, &layout(), &mut store);
        save(&no_ios_permissions(), &ctx, &layout(), &mut store);
        assert!(store.get("/p/Runner/Info.plist").unwrap().contains("reason A"));

        save(&camera(""), &ctx, &layout(), &mut store);
        let plist = store.get("/p/Runner/Info.plist").unwrap();
        assert!(plist.contains("<string>reason A</string>"), "{}", plist);
        assert!(!plist.contains(TODO_DESCRIPTION));
    }

    #[test]
    fn test_deleted_description_comes_back_as_placeholder() {
        let catalog = Catalog::builtin().unwrap();
        let mut store = store();
        save(&camera("reason A"), &SaveContext::new(&catalog), &layout(), &mut store);

        let mut ctx = SaveContext::new(&catalog);
        ctx.previous_ios_permissions = vec!["NSCameraUsageDescription".to_string()];
        save(&no_ios_permissions(), &ctx, &layout(), &mut store);
        assert!(!store.get("/p/Runner/Info.plist").unwrap().contains("NSCameraUsageDescription"));

        save(&camera(""), &SaveContext::new(&catalog), &layout(), &mut store);
        let plist = store.get("/p/Runner/Info.plist").unwrap();
        assert!(plist.contains(&format!("<string>{}</string>", TODO_DESCRIPTION)), "{}", plist);
        assert!(!plist.contains("reason A"));
    }

    #[test]
    fn test_service_removed_when_absent_from_request() {
        let catalog = Catalog::builtin().unwrap();
        let mut store = store();
        let maps = ServiceEntry::new("googleMaps").with_value("apiKey", "K1");
        let add = SaveRequest {
            services: vec![maps.clone()],
            ..Default::default()
        };
        save(&add, &SaveContext::new(&catalog), &layout(), &mut store);
        assert!(store.get("/p/AndroidManifest.xml").unwrap().contains("com.google.android.geo.API_KEY"));

        let mut ctx = SaveContext::new(&catalog);
        ctx.previous_services = vec![maps];
        save(&SaveRequest::default(), &ctx, &layout(), &mut store);
        assert_eq!(store.get("/p/AndroidManifest.xml"), Some(MANIFEST));
    }

    #[test]
    fn test_changed_value_replaces_templated_fragments() {
        let catalog = Catalog::builtin().unwrap();
        let mut store = store();
        let first = ServiceEntry::new("facebook")
            .with_value("appId", "123")
            .with_value("clientToken", "tok");
        let request = SaveRequest {
            services: vec![first.clone()],
            ..Default::default()
        };
        save(&request, &SaveContext::new(&catalog), &layout(), &mut store);

        let mut ctx = SaveContext::new(&catalog);
        ctx.previous_services = vec![first];
        let changed = SaveRequest {
            services: vec![ServiceEntry::new("facebook")
                .with_value("appId", "456")
                .with_value("clientToken", "tok")],
            ..Default::default()
        };
        save(&changed, &ctx, &layout(), &mut store);

        let manifest = store.get("/p/AndroidManifest.xml").unwrap();
        assert!(manifest.contains("android:scheme=\"fb456\""));
        assert!(!manifest.contains("fb123"));
        assert!(!store.get("/p/Runner/Info.plist").unwrap().contains("fb123"));
    }

    struct DecliningStore(MemoryStore);

    impl DocumentStore for DecliningStore {
        fn read(&self, path: &Path) -> Option<String> {
            self.0.read(path)
        }

        fn write(&mut self, path: &Path, content: &str) -> Result<(), StoreError> {
            if path.ends_with("AndroidManifest.xml") {
                return Err(StoreError::Declined(path.to_path_buf()));
            }
            self.0.write(path, content)
        }
    }

    #[test]
    fn test_declined_write_is_skipped() {
        let catalog = Catalog::builtin().unwrap();
        let request = SaveRequest {
            android_permissions: Some(vec!["CAMERA".to_string()]),
            ios_permissions: Some(vec![PermissionEntry::text("NSCameraUsageDescription", "Scan")]),
            services: vec![],
        };
        let mut store = DecliningStore(store());

        let outcome = save(&request, &SaveContext::new(&catalog), &layout(), &mut store);
        assert!(outcome.success);
        assert!(!outcome.written.contains(&PathBuf::from("/p/AndroidManifest.xml")));
        assert_eq!(store.0.get("/p/AndroidManifest.xml"), Some(MANIFEST));
        assert!(store.0.get("/p/Runner/Info.plist").unwrap().contains("<string>Scan</string>"));
    }

    #[test]
    fn test_podfile_failure_is_not_fatal() {
        let catalog = Catalog::builtin().unwrap();
        let ctx = SaveContext::new(&catalog);
        let mut store = store().with("/p/Podfile", "config.build_settings['GCC_PREPROCESSOR_DEFINITIONS'] ||= [\n");
        let request = SaveRequest {
            ios_permissions: Some(vec![PermissionEntry::text("NSCameraUsageDescription", "Scan")]),
            ..Default::default()
        };
        let outcome = save(&request, &ctx, &layout(), &mut store);
        assert!(outcome.success);
        assert_eq!(outcome.written, vec![PathBuf::from("/p/Runner/Info.plist")]);
    }
}
