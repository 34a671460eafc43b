//! Session integration tests
//!
//! These tests discover a copied Flutter project on disk, save desired states
//! through the filesystem store and read the result back with the extractor.

use manifestpatch::catalog::Catalog;
use manifestpatch::config::Config;
use manifestpatch::discovery::{FileFinder, ProjectLayout};
use manifestpatch::extract::{declared_permissions, extract_services};
use manifestpatch::ios::services::url_schemes;
use manifestpatch::model::{SaveRequest, ServiceEntry};
use manifestpatch::session::{load_sources, save, FsStore, SaveContext};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get the path to the test fixtures directory
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Copy the Flutter fixture into a temp dir and discover its documents
fn project() -> (TempDir, ProjectLayout) {
    let dir = TempDir::new().unwrap();
    copy_dir(&fixtures_path().join("flutter_app"), dir.path());
    let layout = FileFinder::new(&Config::default()).discover(dir.path()).unwrap();
    (dir, layout)
}

fn read_state(name: &str) -> SaveRequest {
    let contents = fs::read_to_string(fixtures_path().join(name)).unwrap();
    if name.ends_with(".json") {
        serde_json::from_str(&contents).unwrap()
    } else {
        serde_yaml::from_str(&contents).unwrap()
    }
}

/// Build a context the way the CLI does: what the documents configure now is
/// the previous state.
fn context<'a>(catalog: &'a Catalog, layout: &ProjectLayout) -> SaveContext<'a> {
    let sources = load_sources(layout, &FsStore);
    let mut ctx = SaveContext::new(catalog);
    ctx.previous_services = extract_services(&sources, catalog);
    ctx.previous_ios_permissions = declared_permissions(&sources)
        .ios
        .into_iter()
        .map(|entry| entry.key)
        .filter(|key| catalog.permissions.ios_permission(key).is_some())
        .collect();
    ctx
}

fn read(path: &Option<PathBuf>) -> String {
    fs::read_to_string(path.as_ref().unwrap()).unwrap()
}

#[test]
fn test_discovers_flutter_layout() {
    let (dir, layout) = project();
    let root = dir.path();

    assert_eq!(layout.manifest, Some(root.join("android/app/src/main/AndroidManifest.xml")));
    assert_eq!(layout.strings, Some(root.join("android/app/src/main/res/values/strings.xml")));
    assert_eq!(layout.plist, Some(root.join("ios/Runner/Info.plist")));
    assert_eq!(layout.podfile, Some(root.join("ios/Podfile")));
    assert_eq!(layout.app_delegate, Some(root.join("ios/Runner/AppDelegate.swift")));
    assert_eq!(layout.xcode_project, Some(root.join("ios/Runner.xcodeproj/project.pbxproj")));
    assert_eq!(layout.entitlements, None);
}

#[test]
fn test_save_then_extract() {
    let catalog = Catalog::builtin().unwrap();
    let (_dir, layout) = project();
    let request = read_state("state_full.json");

    let outcome = save(&request, &context(&catalog, &layout), &layout, &mut FsStore);
    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.written.contains(layout.manifest.as_ref().unwrap()));
    assert!(outcome.written.contains(layout.podfile.as_ref().unwrap()));

    let manifest = read(&layout.manifest);
    assert!(manifest.contains("android.permission.CAMERA"));
    assert!(manifest.contains("android:value=\"MAPS_KEY\""));
    assert!(read(&layout.podfile).contains("'PERMISSION_CAMERA=1'"));
    assert!(read(&layout.plist).contains("<string>Scan documents</string>"));

    let sources = load_sources(&layout, &FsStore);
    let services = extract_services(&sources, &catalog);
    let ids: Vec<&str> = services.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["facebook", "googleMaps"]);
    assert_eq!(services[0].value("appId"), Some("123"));
    assert_eq!(services[0].value("clientToken"), Some("tok"));
    assert_eq!(services[1].value("apiKey"), Some("MAPS_KEY"));
}

#[test]
fn test_second_save_writes_nothing() {
    let catalog = Catalog::builtin().unwrap();
    let (_dir, layout) = project();
    let request = read_state("state_full.json");

    let first = save(&request, &context(&catalog, &layout), &layout, &mut FsStore);
    assert!(first.success);

    let second = save(&request, &context(&catalog, &layout), &layout, &mut FsStore);
    assert!(second.success);
    assert!(second.written.is_empty(), "rewrote {:?}", second.written);
}

#[test]
fn test_dropping_services_restores_documents() {
    let catalog = Catalog::builtin().unwrap();
    let (dir, layout) = project();
    let original_delegate = read(&layout.app_delegate);
    let original_strings = read(&layout.strings);

    let request = read_state("state_full.json");
    save(&request, &context(&catalog, &layout), &layout, &mut FsStore);

    let without_services = SaveRequest {
        services: Vec::new(),
        ..request
    };
    let outcome = save(&without_services, &context(&catalog, &layout), &layout, &mut FsStore);
    assert!(outcome.success);

    let manifest = read(&layout.manifest);
    assert!(!manifest.contains("com.facebook"));
    assert!(!manifest.contains("com.google.android.geo.API_KEY"));
    assert!(manifest.contains("android.permission.CAMERA"));
    assert_eq!(read(&layout.app_delegate), original_delegate);
    assert_eq!(read(&layout.strings), original_strings);
    assert!(!dir.path().join("ios/Runner/Runner.entitlements").exists());
}

#[test]
fn test_dropped_ios_permission_removed() {
    let catalog = Catalog::builtin().unwrap();
    let (_dir, layout) = project();
    let request = read_state("state_full.json");
    save(&request, &context(&catalog, &layout), &layout, &mut FsStore);

    let without_camera = SaveRequest {
        ios_permissions: Some(Vec::new()),
        ..request
    };
    save(&without_camera, &context(&catalog, &layout), &layout, &mut FsStore);

    let plist = read(&layout.plist);
    assert!(!plist.contains("NSCameraUsageDescription"));
    assert!(plist.contains("<key>CFBundleDisplayName</key>"));
}

#[test]
fn test_app_links_across_platforms() {
    let catalog = Catalog::builtin().unwrap();
    let (dir, layout) = project();
    let request = read_state("state_links.yaml");

    let outcome = save(&request, &context(&catalog, &layout), &layout, &mut FsStore);
    assert!(outcome.success, "{}", outcome.message);

    assert!(read(&layout.manifest).contains("<!-- applinks:start -->"));
    let entitlements = fs::read_to_string(dir.path().join("ios/Runner/Runner.entitlements")).unwrap();
    assert!(entitlements.contains("<string>applinks:example.com</string>"));
    assert_eq!(url_schemes(&read(&layout.plist)), vec!["demo"]);

    // Rediscover so the new entitlements file is picked up
    let layout = FileFinder::new(&Config::default()).discover(dir.path()).unwrap();
    let sources = load_sources(&layout, &FsStore);
    let links: ServiceEntry = extract_services(&sources, &catalog)
        .into_iter()
        .find(|s| s.id == "applinks")
        .unwrap();
    assert_eq!(links.value("domains"), Some("example.com, demo://"));
    assert_eq!(links.value("packageName"), Some("com.example.demo"));
    assert_eq!(links.value("teamId"), Some("ABCDE12345"));
    assert_eq!(links.value("bundleId"), Some("com.example.demo"));
}

#[test]
fn test_project_without_documents_fails() {
    let catalog = Catalog::builtin().unwrap();
    let dir = TempDir::new().unwrap();
    let layout = FileFinder::new(&Config::default()).discover(dir.path()).unwrap();

    let outcome = save(&SaveRequest::default(), &SaveContext::new(&catalog), &layout, &mut FsStore);
    assert!(!outcome.success);
    assert!(outcome.written.is_empty());
}
